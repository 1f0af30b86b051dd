//! Client authentication against the client directory

use std::sync::Arc;

use chrono::Utc;
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::credential_parser::{ClientCredentialParseResult, CredentialSource};
use crate::audit::{AuditEvent, AuditLogger};
use crate::error::{ErrorCode, Result, ValidationError};
use crate::models::{Client, ClientSecret, SecretType, hash_sha256, hash_sha512};
use crate::stores::ClientStore;

/// Authenticates clients from parsed credentials
#[derive(Debug, Clone)]
pub struct ClientValidator {
    clients: Arc<dyn ClientStore>,
    audit: AuditLogger,
}

impl ClientValidator {
    pub fn new(clients: Arc<dyn ClientStore>, audit: AuditLogger) -> Self {
        Self { clients, audit }
    }

    /// Resolve and authenticate the client behind `credentials`
    ///
    /// Every failure is `invalid_client`; the audit record carries the reason.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use keyward::audit::AuditLogger;
    /// # use keyward::memory::InMemoryClientStore;
    /// # use keyward::models::{Client, ClientSecret, Flow, Parameters};
    /// # use keyward::validation::{ClientValidator, parse_client_credentials};
    /// # tokio_test::block_on(async {
    /// let clients = InMemoryClientStore::new([Client::new("svc", Flow::ClientCredentials)
    ///     .with_secret(ClientSecret::sha256("s3cret"))]);
    /// let validator = ClientValidator::new(Arc::new(clients), AuditLogger::default());
    ///
    /// let body: Parameters = [("client_id", "svc"), ("client_secret", "s3cret")]
    ///     .into_iter()
    ///     .collect();
    /// let credentials = parse_client_credentials(None, &body, None);
    /// let client = validator.validate(&credentials).await.unwrap();
    /// assert_eq!(client.client_id, "svc");
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidClient`] validation errors, or a store failure.
    pub async fn validate(&self, credentials: &ClientCredentialParseResult) -> Result<Client> {
        if credentials.is_malformed {
            return Err(self.reject(None, "malformed Authorization header"));
        }

        let Some(client_id) = credentials.client_id() else {
            return Err(self.reject(None, "no client credentials presented"));
        };

        let Some(client) = self.clients.find_client_by_id(client_id).await? else {
            return Err(self.reject(Some(client_id), "unknown client"));
        };

        if !client.enabled {
            return Err(self.reject(Some(client_id), "client is disabled"));
        }

        let now = Utc::now();
        let active: Vec<&ClientSecret> = client
            .client_secrets
            .iter()
            .filter(|secret| !secret.is_expired(now))
            .collect();

        let method = if let Some(credential) = &credentials.credential {
            let presented = credential.secret.expose_secret();
            if !active.iter().any(|secret| secret_matches(secret, presented)) {
                return Err(self.reject(Some(client_id), "invalid client secret"));
            }
            credential.source
        } else if let Some(certificate) = &credentials.certificate {
            let matched = active.iter().any(|secret| {
                secret.secret_type == SecretType::X509Thumbprint
                    && secret
                        .value
                        .eq_ignore_ascii_case(certificate.thumbprint.as_str())
            });
            if !matched {
                return Err(self.reject(Some(client_id), "unknown client certificate"));
            }
            CredentialSource::X509Certificate
        } else {
            return Err(self.reject(Some(client_id), "no client credentials presented"));
        };

        debug!(client_id = %client.client_id, method = method.as_str(), "Client authenticated");
        self.audit.log(AuditEvent::ClientAuthenticated {
            client_id: client.client_id.clone(),
            method: method.as_str().to_string(),
        });
        Ok(client)
    }

    fn reject(&self, client_id: Option<&str>, reason: &str) -> crate::Error {
        warn!(client_id = ?client_id, reason, "Client authentication failed");
        self.audit.log(AuditEvent::ClientAuthenticationFailed {
            client_id: client_id.map(str::to_string),
            reason: reason.to_string(),
        });
        ValidationError::client(ErrorCode::InvalidClient)
            .with_description(reason)
            .into()
    }
}

/// Constant-time comparison of a presented secret with a stored one
fn secret_matches(stored: &ClientSecret, presented: &str) -> bool {
    let candidate = match stored.secret_type {
        SecretType::SharedSecret => presented.to_string(),
        SecretType::Sha256 => hash_sha256(presented),
        SecretType::Sha512 => hash_sha512(presented),
        SecretType::X509Thumbprint => return false,
    };
    bool::from(candidate.as_bytes().ct_eq(stored.value.as_bytes()))
}
