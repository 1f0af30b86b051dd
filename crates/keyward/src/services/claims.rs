use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ClaimsProvider, UserService};
use crate::constants::claim_types;
use crate::error::Result;
use crate::models::{AuthenticatedUser, Claim, Client, Parameters, Scope};

/// Claims assembled from the scope catalog and the user service
#[derive(Debug, Clone)]
pub struct DefaultClaimsProvider {
    users: Arc<dyn UserService>,
}

impl DefaultClaimsProvider {
    pub fn new(users: Arc<dyn UserService>) -> Self {
        Self { users }
    }

    fn standard_subject_claims(subject: &AuthenticatedUser) -> Vec<Claim> {
        vec![
            Claim::new(claim_types::SUBJECT, subject.subject_id.clone()),
            Claim::new(
                claim_types::AUTHENTICATION_TIME,
                subject.auth_time.timestamp(),
            ),
            Claim::new(
                claim_types::IDENTITY_PROVIDER,
                subject.identity_provider.clone(),
            ),
            Claim::new(
                claim_types::AUTHENTICATION_METHOD,
                subject.authentication_method.clone(),
            ),
        ]
    }

    /// Profile claims of `subject` for `claim_types`, minus the ones already set
    async fn profile_claims(
        &self,
        subject: &AuthenticatedUser,
        claim_types: Vec<String>,
        existing: &[Claim],
    ) -> Result<Vec<Claim>> {
        let claims = self.users.get_profile_claims(subject, &claim_types).await?;
        Ok(claims
            .into_iter()
            .filter(|c| !existing.iter().any(|e| e.claim_type == c.claim_type))
            .collect())
    }
}

#[async_trait]
impl ClaimsProvider for DefaultClaimsProvider {
    async fn identity_token_claims(
        &self,
        subject: &AuthenticatedUser,
        client: &Client,
        scopes: &[Scope],
        include_all_identity_claims: bool,
        _parameters: &Parameters,
    ) -> Result<Vec<Claim>> {
        let mut claims = Self::standard_subject_claims(subject);

        let mut wants_everything = false;
        let mut requested: Vec<String> = Vec::new();
        for scope in scopes.iter().filter(|s| s.is_identity()) {
            if include_all_identity_claims && scope.include_all_claims_for_user {
                wants_everything = true;
            }
            for claim in &scope.claims {
                if (include_all_identity_claims || claim.always_include_in_id_token)
                    && claim.name != claim_types::SUBJECT
                    && !requested.contains(&claim.name)
                {
                    requested.push(claim.name.clone());
                }
            }
        }

        if wants_everything || !requested.is_empty() {
            let types = if wants_everything { Vec::new() } else { requested };
            let profile = self.profile_claims(subject, types, &claims).await?;
            claims.extend(profile);
        }

        debug!(
            client_id = %client.client_id,
            claim_count = claims.len(),
            "Assembled identity token claims"
        );
        Ok(claims)
    }

    async fn access_token_claims(
        &self,
        subject: Option<&AuthenticatedUser>,
        client: &Client,
        scopes: &[Scope],
        _parameters: &Parameters,
    ) -> Result<Vec<Claim>> {
        let mut claims = vec![Claim::new(claim_types::CLIENT_ID, client.client_id.clone())];
        claims.extend(
            scopes
                .iter()
                .map(|scope| Claim::new(claim_types::SCOPE, scope.name.clone())),
        );

        match subject {
            Some(subject) => {
                let standard = Self::standard_subject_claims(subject);
                claims.extend(standard);

                let mut requested: Vec<String> = Vec::new();
                for scope in scopes.iter().filter(|s| !s.is_identity()) {
                    for name in scope.claim_names() {
                        if !requested.iter().any(|r| r == name) {
                            requested.push(name.to_string());
                        }
                    }
                }
                if !requested.is_empty() {
                    let profile = self.profile_claims(subject, requested, &claims).await?;
                    claims.extend(profile);
                }

                if client.always_send_client_claims {
                    claims.extend(client_claims(client));
                }
            }
            None => claims.extend(client_claims(client)),
        }

        Ok(claims)
    }
}

/// Client claims, prefixed `client_` unless already prefixed
fn client_claims(client: &Client) -> impl Iterator<Item = Claim> + '_ {
    client.claims.iter().map(|claim| {
        if claim.claim_type.starts_with("client_") {
            claim.clone()
        } else {
            Claim::new(format!("client_{}", claim.claim_type), claim.value.clone())
        }
    })
}
