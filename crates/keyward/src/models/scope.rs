use serde::{Deserialize, Serialize};

use crate::constants::StandardScope;

/// Identity scopes release user claims, resource scopes grant API access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Identity,
    Resource,
}

/// A claim released by a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeClaim {
    pub name: String,
    pub description: Option<String>,
    /// Put the claim into the identity token even when an access token is issued
    pub always_include_in_id_token: bool,
}

impl ScopeClaim {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            always_include_in_id_token: false,
        }
    }
}

/// A named permission unit from the scope catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub scope_type: ScopeType,
    /// Cannot be deselected on the consent screen
    pub required: bool,
    /// Highlighted on the consent screen
    pub emphasize: bool,
    /// Disabled scopes behave as if they did not exist
    pub enabled: bool,
    pub include_all_claims_for_user: bool,
    pub show_in_discovery_document: bool,
    pub claims: Vec<ScopeClaim>,
}

impl Scope {
    fn new(name: impl Into<String>, scope_type: ScopeType) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            scope_type,
            required: false,
            emphasize: false,
            enabled: true,
            include_all_claims_for_user: false,
            show_in_discovery_document: true,
            claims: Vec::new(),
        }
    }

    /// Identity scope without claims
    pub fn identity(name: impl Into<String>) -> Self {
        Self::new(name, ScopeType::Identity)
    }

    /// Resource (API) scope
    pub fn resource(name: impl Into<String>) -> Self {
        Self::new(name, ScopeType::Resource)
    }

    /// Scope definition for an OIDC standard scope
    pub fn standard(standard: StandardScope) -> Self {
        let mut scope = match standard {
            StandardScope::OfflineAccess => Self::resource(standard.name()),
            _ => Self::identity(standard.name()),
        };
        scope.claims = standard
            .claims()
            .iter()
            .map(|claim| ScopeClaim::new(*claim))
            .collect();
        match standard {
            StandardScope::OpenId => {
                scope.required = true;
                if let Some(sub) = scope.claims.first_mut() {
                    sub.always_include_in_id_token = true;
                }
            }
            StandardScope::OfflineAccess => scope.emphasize = true,
            _ => {}
        }
        scope
    }

    /// Every standard scope
    pub fn standard_scopes() -> Vec<Scope> {
        StandardScope::ALL.into_iter().map(Scope::standard).collect()
    }

    #[must_use]
    pub fn with_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claims = claims.into_iter().map(ScopeClaim::new).collect();
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.scope_type == ScopeType::Identity
    }

    /// Claim names released by this scope
    pub fn claim_names(&self) -> impl Iterator<Item = &str> {
        self.claims.iter().map(|c| c.name.as_str())
    }
}
