use serde::{Deserialize, Serialize};

/// Remembered consent of a subject for a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// The user's answer on the consent page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConsent {
    /// `false` means the user pressed "deny"
    pub granted: bool,
    /// Scopes the user left selected
    pub scopes: Vec<String>,
    /// Remember the decision for subsequent requests
    pub remember: bool,
}

impl UserConsent {
    pub fn granted<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: true,
            scopes: scopes.into_iter().map(Into::into).collect(),
            remember: false,
        }
    }

    pub fn denied() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn remembered(mut self) -> Self {
        self.remember = true;
        self
    }
}
