use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::ConsentService;
use crate::constants::OFFLINE_ACCESS_SCOPE;
use crate::error::Result;
use crate::models::{AuthenticatedUser, Client, Consent};
use crate::stores::ConsentStore;

/// Consent policy over a [`ConsentStore`]
///
/// - clients with `require_consent = false` never prompt
/// - clients that may not remember consent always prompt
/// - `offline_access` always prompts
/// - otherwise the request prompts unless a remembered consent covers every scope
#[derive(Debug, Clone)]
pub struct DefaultConsentService {
    store: Arc<dyn ConsentStore>,
}

impl DefaultConsentService {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConsentService for DefaultConsentService {
    async fn requires_consent(
        &self,
        client: &Client,
        subject: &AuthenticatedUser,
        scopes: &[String],
    ) -> Result<bool> {
        if !client.require_consent {
            return Ok(false);
        }

        if !client.allow_remember_consent {
            return Ok(true);
        }

        if scopes.iter().any(|s| s == OFFLINE_ACCESS_SCOPE) {
            return Ok(true);
        }

        let remembered = self
            .store
            .load(&subject.subject_id, &client.client_id)
            .await?;

        let covered = match remembered {
            Some(consent) => scopes.iter().all(|s| consent.scopes.contains(s)),
            None => false,
        };
        debug!(
            client_id = %client.client_id,
            covered,
            "Checked remembered consent"
        );
        Ok(!covered)
    }

    async fn update_consent(
        &self,
        client: &Client,
        subject: &AuthenticatedUser,
        scopes: &[String],
    ) -> Result<()> {
        if !client.allow_remember_consent {
            return Ok(());
        }

        if scopes.is_empty() {
            return self
                .store
                .revoke(&subject.subject_id, &client.client_id)
                .await;
        }

        self.store
            .update(Consent {
                subject: subject.subject_id.clone(),
                client_id: client.client_id.clone(),
                scopes: scopes.to_vec(),
            })
            .await
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::memory::InMemoryConsentStore;
    use crate::models::Flow;

    fn scopes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn service() -> (DefaultConsentService, Arc<InMemoryConsentStore>) {
        let store = Arc::new(InMemoryConsentStore::new());
        (DefaultConsentService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_client_without_consent_requirement() {
        let (service, _) = service();
        let client = Client::new("c", Flow::Implicit).without_consent();
        let user = AuthenticatedUser::new("alice", "idsrv");
        assert!(
            !service
                .requires_consent(&client, &user, &scopes(&["openid"]))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_remembered_consent_covers_subset() {
        let (service, _) = service();
        let client = Client::new("c", Flow::Implicit);
        let user = AuthenticatedUser::new("alice", "idsrv");

        assert!(
            service
                .requires_consent(&client, &user, &scopes(&["openid"]))
                .await
                .unwrap()
        );

        service
            .update_consent(&client, &user, &scopes(&["openid", "profile"]))
            .await
            .unwrap();

        assert!(
            !service
                .requires_consent(&client, &user, &scopes(&["openid"]))
                .await
                .unwrap()
        );
        assert!(
            service
                .requires_consent(&client, &user, &scopes(&["openid", "email"]))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_offline_access_always_prompts() {
        let (service, _) = service();
        let client = Client::new("c", Flow::AuthorizationCode);
        let user = AuthenticatedUser::new("alice", "idsrv");
        service
            .update_consent(&client, &user, &scopes(&["openid", "offline_access"]))
            .await
            .unwrap();
        assert!(
            service
                .requires_consent(&client, &user, &scopes(&["openid", "offline_access"]))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_update_revokes() {
        let (service, store) = service();
        let client = Client::new("c", Flow::Implicit);
        let user = AuthenticatedUser::new("alice", "idsrv");
        service
            .update_consent(&client, &user, &scopes(&["openid"]))
            .await
            .unwrap();
        service.update_consent(&client, &user, &[]).await.unwrap();
        assert!(store.load("alice", "c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_remember_never_persists() {
        let (service, store) = service();
        let mut client = Client::new("c", Flow::Implicit);
        client.allow_remember_consent = false;
        let user = AuthenticatedUser::new("alice", "idsrv");
        service
            .update_consent(&client, &user, &scopes(&["openid"]))
            .await
            .unwrap();
        assert!(store.load("alice", "c").await.unwrap().is_none());
    }
}
