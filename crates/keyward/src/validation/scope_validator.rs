//! Scope parsing, catalog lookup and classification

use std::sync::Arc;

use tracing::warn;

use crate::constants::{OFFLINE_ACCESS_SCOPE, OPENID_SCOPE, ScopeRequirement};
use crate::error::{ErrorCode, Result, ValidationError};
use crate::models::{Client, Scope};
use crate::stores::ScopeStore;

/// Split a space-delimited scope string into an ordered, de-duplicated list
pub fn parse_scopes(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for name in scope.split_whitespace() {
        if !scopes.iter().any(|s| s == name) {
            scopes.push(name.to_string());
        }
    }
    scopes
}

/// First requested scope outside the client's allow-list
pub fn first_disallowed<'a>(client: &Client, requested: &'a [String]) -> Option<&'a str> {
    requested
        .iter()
        .map(String::as_str)
        .find(|scope| !client.allows_scope(scope))
}

/// Catalog-resolved scopes of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedScopes {
    /// Everything the client asked for
    pub requested_scopes: Vec<Scope>,
    /// What the subject ends up granting (narrowed by consent)
    pub granted_scopes: Vec<Scope>,
    pub contains_open_id_scopes: bool,
    pub contains_resource_scopes: bool,
    pub contains_offline_access_scope: bool,
}

impl ValidatedScopes {
    fn new(requested_scopes: Vec<Scope>) -> Self {
        let mut scopes = Self {
            granted_scopes: requested_scopes.clone(),
            requested_scopes,
            contains_open_id_scopes: false,
            contains_resource_scopes: false,
            contains_offline_access_scope: false,
        };
        scopes.classify();
        scopes
    }

    fn classify(&mut self) {
        self.contains_open_id_scopes = self.granted_scopes.iter().any(Scope::is_identity);
        self.contains_resource_scopes = self.granted_scopes.iter().any(|s| !s.is_identity());
        self.contains_offline_access_scope = self
            .granted_scopes
            .iter()
            .any(|s| s.name == OFFLINE_ACCESS_SCOPE);
    }

    /// Keep only required scopes and the ones the subject consented to
    #[must_use]
    pub fn with_consented_scopes(mut self, consented: &[String]) -> Self {
        self.granted_scopes = self
            .requested_scopes
            .iter()
            .filter(|s| s.required || consented.iter().any(|c| *c == s.name))
            .cloned()
            .collect();
        self.classify();
        self
    }

    /// Whether the classification satisfies what the response type needs
    pub fn satisfies(&self, requirement: ScopeRequirement) -> bool {
        match requirement {
            ScopeRequirement::None => true,
            ScopeRequirement::ResourceOnly => {
                self.contains_resource_scopes && !self.contains_open_id_scopes
            }
            ScopeRequirement::IdentityOnly => {
                self.contains_open_id_scopes && !self.contains_resource_scopes
            }
            ScopeRequirement::Identity => self.contains_open_id_scopes,
        }
    }

    pub fn requested_scope_names(&self) -> Vec<String> {
        self.requested_scopes.iter().map(|s| s.name.clone()).collect()
    }

    pub fn granted_scope_names(&self) -> Vec<String> {
        self.granted_scopes.iter().map(|s| s.name.clone()).collect()
    }

    /// Space-delimited granted scopes
    pub fn granted_scope_string(&self) -> String {
        self.granted_scope_names().join(" ")
    }

    pub fn is_granted(&self, name: &str) -> bool {
        self.granted_scopes.iter().any(|s| s.name == name)
    }

    pub fn is_open_id(&self) -> bool {
        self.is_granted(OPENID_SCOPE)
    }
}

/// Resolves requested scope names against the scope catalog
#[derive(Debug, Clone)]
pub struct ScopeValidator {
    scopes: Arc<dyn ScopeStore>,
}

impl ScopeValidator {
    pub fn new(scopes: Arc<dyn ScopeStore>) -> Self {
        Self { scopes }
    }

    /// Resolve every requested scope; unknown or disabled ones are `invalid_scope`
    ///
    /// # Errors
    ///
    /// `invalid_scope` (Client), or a scope store failure.
    pub async fn validate(&self, requested: &[String]) -> Result<ValidatedScopes> {
        let catalog = self.scopes.find_scopes(requested).await?;

        let mut resolved = Vec::with_capacity(requested.len());
        for name in requested {
            match catalog.iter().find(|s| s.name == *name && s.enabled) {
                Some(scope) => resolved.push(scope.clone()),
                None => {
                    warn!(scope = %name, "Requested scope is unknown or disabled");
                    return Err(ValidationError::client(ErrorCode::InvalidScope)
                        .with_description(format!("unknown scope: {name}"))
                        .into());
                }
            }
        }

        Ok(ValidatedScopes::new(resolved))
    }
}
