//! Structured audit trail for security relevant pipeline decisions
//!
//! Every event is wrapped in an [`AuditRecord`] and emitted through `tracing`
//! under the `audit::keyward` target, so hosts can route the audit trail
//! separately from diagnostic logs.
//!
//! ## Events
//!
//! - client authentication success and failure
//! - rejected authorize requests
//! - authorization code issuance, redemption and rejection
//! - token issuance
//! - refresh token rotation (old handle → new handle, emitted even when equal)
//! - consent decisions
//! - failed token validation
//!
//! Token handles and codes are never written in clear; records carry a
//! fingerprint instead. Subject and client identifiers are hashed when the
//! logger is configured with identifier hashing.
//!
//! ```rust
//! use keyward::audit::{AuditEvent, AuditLogger};
//!
//! let logger = AuditLogger::new("keyward").with_identifier_hashing(true);
//! let record = logger.log(AuditEvent::ConsentDenied {
//!     client_id: "codeclient".to_string(),
//!     subject: "818727".to_string(),
//! });
//! assert_eq!(record.service, "keyward");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuditOptions;
use crate::error::{ErrorCode, ErrorType};

/// Audit logger
#[derive(Debug, Clone)]
pub struct AuditLogger {
    service_name: String,
    hash_identifiers: bool,
}

impl AuditLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: false,
        }
    }

    pub fn from_options(options: &AuditOptions) -> Self {
        Self::new(options.service_name.clone()).with_identifier_hashing(options.hash_identifiers)
    }

    /// Hash subject and client identifiers
    pub fn with_identifier_hashing(mut self, hash: bool) -> Self {
        self.hash_identifiers = hash;
        self
    }

    /// Emit an event and return the record that was written
    pub fn log(&self, event: AuditEvent) -> AuditRecord {
        let record = AuditRecord {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            service: self.service_name.clone(),
            event: self.redact(event),
        };

        match &record.event {
            AuditEvent::ClientAuthenticated { client_id, method } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "client_authenticated",
                    client_id = %client_id,
                    method = %method,
                    service = %self.service_name,
                    "Client authenticated"
                );
            }
            AuditEvent::ClientAuthenticationFailed { client_id, reason } => {
                warn!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "client_authentication_failed",
                    client_id = ?client_id,
                    reason = %reason,
                    service = %self.service_name,
                    "Client authentication failed"
                );
            }
            AuditEvent::AuthorizeRequestRejected {
                client_id,
                error,
                error_type,
                reason,
            } => {
                warn!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "authorize_request_rejected",
                    client_id = ?client_id,
                    error = %error,
                    error_type = ?error_type,
                    reason = %reason,
                    service = %self.service_name,
                    "Authorize request rejected"
                );
            }
            AuditEvent::AuthorizationCodeIssued {
                client_id,
                subject,
                code,
                scopes,
            } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "authorization_code_issued",
                    client_id = %client_id,
                    subject = %subject,
                    code = %code,
                    scopes = ?scopes,
                    service = %self.service_name,
                    "Authorization code issued"
                );
            }
            AuditEvent::AuthorizationCodeRedeemed {
                client_id,
                subject,
                code,
            } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "authorization_code_redeemed",
                    client_id = %client_id,
                    subject = %subject,
                    code = %code,
                    service = %self.service_name,
                    "Authorization code redeemed"
                );
            }
            AuditEvent::AuthorizationCodeRejected {
                client_id,
                code,
                reason,
            } => {
                warn!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "authorization_code_rejected",
                    client_id = %client_id,
                    code = %code,
                    reason = %reason,
                    service = %self.service_name,
                    "Authorization code rejected"
                );
            }
            AuditEvent::TokenIssued {
                client_id,
                subject,
                token_type,
                expires_in,
                scopes,
            } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "token_issued",
                    client_id = %client_id,
                    subject = ?subject,
                    token_type = %token_type,
                    expires_in_secs = %expires_in,
                    scopes = ?scopes,
                    service = %self.service_name,
                    "Token issued"
                );
            }
            AuditEvent::RefreshTokenRotated {
                client_id,
                subject,
                old_handle,
                new_handle,
                version,
            } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "refresh_token_rotated",
                    client_id = %client_id,
                    subject = ?subject,
                    old_handle = %old_handle,
                    new_handle = %new_handle,
                    rotated = old_handle != new_handle,
                    version = %version,
                    service = %self.service_name,
                    "Refresh token updated"
                );
            }
            AuditEvent::RefreshTokenRejected {
                client_id,
                handle,
                reason,
            } => {
                warn!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "refresh_token_rejected",
                    client_id = %client_id,
                    handle = %handle,
                    reason = %reason,
                    service = %self.service_name,
                    "Refresh token rejected"
                );
            }
            AuditEvent::ConsentGranted {
                client_id,
                subject,
                scopes,
                remembered,
            } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "consent_granted",
                    client_id = %client_id,
                    subject = %subject,
                    scopes = ?scopes,
                    remembered = %remembered,
                    service = %self.service_name,
                    "Consent granted"
                );
            }
            AuditEvent::ConsentDenied { client_id, subject } => {
                info!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "consent_denied",
                    client_id = %client_id,
                    subject = %subject,
                    service = %self.service_name,
                    "Consent denied"
                );
            }
            AuditEvent::TokenValidationFailed { error, reason } => {
                warn!(
                    target: "audit::keyward",
                    audit_id = %record.id,
                    event_type = "token_validation_failed",
                    error = %error,
                    reason = %reason,
                    service = %self.service_name,
                    "Token validation failed"
                );
            }
        }

        record
    }

    fn maybe_hash(&self, value: String) -> String {
        if self.hash_identifiers {
            fingerprint(&value)
        } else {
            value
        }
    }

    fn redact(&self, event: AuditEvent) -> AuditEvent {
        match event {
            AuditEvent::ClientAuthenticated { client_id, method } => {
                AuditEvent::ClientAuthenticated {
                    client_id: self.maybe_hash(client_id),
                    method,
                }
            }
            AuditEvent::ClientAuthenticationFailed { client_id, reason } => {
                AuditEvent::ClientAuthenticationFailed {
                    client_id: client_id.map(|c| self.maybe_hash(c)),
                    reason,
                }
            }
            AuditEvent::AuthorizeRequestRejected {
                client_id,
                error,
                error_type,
                reason,
            } => AuditEvent::AuthorizeRequestRejected {
                client_id: client_id.map(|c| self.maybe_hash(c)),
                error,
                error_type,
                reason,
            },
            AuditEvent::AuthorizationCodeIssued {
                client_id,
                subject,
                code,
                scopes,
            } => AuditEvent::AuthorizationCodeIssued {
                client_id: self.maybe_hash(client_id),
                subject: self.maybe_hash(subject),
                code: fingerprint(&code),
                scopes,
            },
            AuditEvent::AuthorizationCodeRedeemed {
                client_id,
                subject,
                code,
            } => AuditEvent::AuthorizationCodeRedeemed {
                client_id: self.maybe_hash(client_id),
                subject: self.maybe_hash(subject),
                code: fingerprint(&code),
            },
            AuditEvent::AuthorizationCodeRejected {
                client_id,
                code,
                reason,
            } => AuditEvent::AuthorizationCodeRejected {
                client_id: self.maybe_hash(client_id),
                code: fingerprint(&code),
                reason,
            },
            AuditEvent::TokenIssued {
                client_id,
                subject,
                token_type,
                expires_in,
                scopes,
            } => AuditEvent::TokenIssued {
                client_id: self.maybe_hash(client_id),
                subject: subject.map(|s| self.maybe_hash(s)),
                token_type,
                expires_in,
                scopes,
            },
            AuditEvent::RefreshTokenRotated {
                client_id,
                subject,
                old_handle,
                new_handle,
                version,
            } => AuditEvent::RefreshTokenRotated {
                client_id: self.maybe_hash(client_id),
                subject: subject.map(|s| self.maybe_hash(s)),
                old_handle: fingerprint(&old_handle),
                new_handle: fingerprint(&new_handle),
                version,
            },
            AuditEvent::RefreshTokenRejected {
                client_id,
                handle,
                reason,
            } => AuditEvent::RefreshTokenRejected {
                client_id: self.maybe_hash(client_id),
                handle: fingerprint(&handle),
                reason,
            },
            AuditEvent::ConsentGranted {
                client_id,
                subject,
                scopes,
                remembered,
            } => AuditEvent::ConsentGranted {
                client_id: self.maybe_hash(client_id),
                subject: self.maybe_hash(subject),
                scopes,
                remembered,
            },
            AuditEvent::ConsentDenied { client_id, subject } => AuditEvent::ConsentDenied {
                client_id: self.maybe_hash(client_id),
                subject: self.maybe_hash(subject),
            },
            other @ AuditEvent::TokenValidationFailed { .. } => other,
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("keyward")
    }
}

/// Short BLAKE3 fingerprint used in place of secrets and identifiers
pub fn fingerprint(value: &str) -> String {
    let hash = blake3::hash(value.as_bytes());
    format!("b3:{}", &hash.to_hex()[..16])
}

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Client credentials checked out
    ClientAuthenticated {
        client_id: String,
        /// `basic`, `post_body` or `x509`
        method: String,
    },

    /// Client credentials were missing, malformed or wrong
    ClientAuthenticationFailed {
        client_id: Option<String>,
        reason: String,
    },

    /// Authorize request failed validation or interaction
    AuthorizeRequestRejected {
        client_id: Option<String>,
        error: ErrorCode,
        error_type: ErrorType,
        reason: String,
    },

    AuthorizationCodeIssued {
        client_id: String,
        subject: String,
        code: String,
        scopes: Vec<String>,
    },

    AuthorizationCodeRedeemed {
        client_id: String,
        subject: String,
        code: String,
    },

    /// Unknown, replayed, expired or cross-client code
    AuthorizationCodeRejected {
        client_id: String,
        code: String,
        reason: String,
    },

    TokenIssued {
        client_id: String,
        subject: Option<String>,
        /// `access_token`, `id_token` or `refresh_token`
        token_type: String,
        expires_in: u32,
        scopes: Vec<String>,
    },

    /// Refresh token used; handles are equal under the reuse policy
    RefreshTokenRotated {
        client_id: String,
        subject: Option<String>,
        old_handle: String,
        new_handle: String,
        version: u32,
    },

    RefreshTokenRejected {
        client_id: String,
        handle: String,
        reason: String,
    },

    ConsentGranted {
        client_id: String,
        subject: String,
        scopes: Vec<String>,
        remembered: bool,
    },

    ConsentDenied {
        client_id: String,
        subject: String,
    },

    TokenValidationFailed {
        error: ErrorCode,
        reason: String,
    },
}

/// A logged audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Time-ordered record identifier
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub event: AuditEvent,
}
