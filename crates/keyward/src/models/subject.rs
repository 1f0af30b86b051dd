use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Claim;

/// A signed-in end user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub subject_id: String,
    pub name: Option<String>,
    /// Identity provider that authenticated the user (`idsrv` for local login)
    pub identity_provider: String,
    /// `amr` value, e.g. `password` or `external`
    pub authentication_method: String,
    pub auth_time: DateTime<Utc>,
    pub claims: Vec<Claim>,
}

impl AuthenticatedUser {
    pub fn new(subject_id: impl Into<String>, identity_provider: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            name: None,
            identity_provider: identity_provider.into(),
            authentication_method: "password".to_string(),
            auth_time: Utc::now(),
            claims: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_authentication_method(mut self, method: impl Into<String>) -> Self {
        self.authentication_method = method.into();
        self
    }

    #[must_use]
    pub fn with_auth_time(mut self, auth_time: DateTime<Utc>) -> Self {
        self.auth_time = auth_time;
        self
    }

    #[must_use]
    pub fn with_claims(mut self, claims: Vec<Claim>) -> Self {
        self.claims = claims;
        self
    }
}

/// The current principal of an authorize request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Subject {
    #[default]
    Anonymous,
    Authenticated(AuthenticatedUser),
}

impl Subject {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Subject::Authenticated(_))
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Subject::Authenticated(user) => Some(user),
            Subject::Anonymous => None,
        }
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.user().map(|u| u.subject_id.as_str())
    }
}

impl From<AuthenticatedUser> for Subject {
    fn from(user: AuthenticatedUser) -> Self {
        Subject::Authenticated(user)
    }
}
