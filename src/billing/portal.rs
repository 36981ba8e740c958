//! Stripe Customer Portal session management.

use super::error::BillingError;
use super::storage::UserStore;
use super::validation::validate_redirect_url;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Creates Customer Portal sessions where subscribers manage or cancel Pro.
pub struct PortalManager<US: UserStore, C: StripePortalClient> {
    users: US,
    client: C,
    config: PortalConfig,
}

impl<US: UserStore, C: StripePortalClient> PortalManager<US, C> {
    #[must_use]
    pub fn new(users: US, client: C, config: PortalConfig) -> Self {
        Self {
            users,
            client,
            config,
        }
    }

    /// Create a portal session for a user with a linked Stripe customer.
    ///
    /// # Errors
    ///
    /// `BillingError::NoCustomer` if the user has never been through checkout.
    pub async fn create_portal_link(&self, user_id: &str, return_url: &str) -> Result<PortalSession> {
        validate_redirect_url(return_url, &self.config.allowed_redirect_domains)?;

        let customer_id = self
            .users
            .get_user(user_id)
            .await?
            .and_then(|user| user.stripe_customer_id)
            .ok_or_else(|| BillingError::NoCustomer {
                user_id: user_id.to_string(),
            })?;

        self.client
            .create_portal_session(CreatePortalSessionRequest {
                customer_id,
                return_url: return_url.to_string(),
                configuration_id: self.config.configuration_id.clone(),
            })
            .await
    }
}

/// Configuration for the customer portal.
#[derive(Debug, Clone, Default)]
pub struct PortalConfig {
    /// Portal configuration ID (for a custom portal configuration).
    pub configuration_id: Option<String>,
    /// Allowed return URL hosts. Empty allows any HTTPS host.
    pub allowed_redirect_domains: Vec<String>,
}

impl PortalConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn configuration_id(mut self, id: impl Into<String>) -> Self {
        self.configuration_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn allowed_redirect_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_redirect_domains = domains;
        self
    }
}

/// Customer portal session response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Request to create a portal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePortalSessionRequest {
    pub customer_id: String,
    pub return_url: String,
    pub configuration_id: Option<String>,
}

/// Trait for Stripe portal operations.
#[async_trait]
pub trait StripePortalClient: Send + Sync {
    async fn create_portal_session(&self, request: CreatePortalSessionRequest)
    -> Result<PortalSession>;
}

#[async_trait]
impl<T: StripePortalClient + ?Sized> StripePortalClient for Arc<T> {
    async fn create_portal_session(
        &self,
        request: CreatePortalSessionRequest,
    ) -> Result<PortalSession> {
        (**self).create_portal_session(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::billing::client::test::MockStripeClient;
    use crate::billing::storage::test::InMemoryStore;
    use crate::error::LessonForgeError;

    async fn store_with_user(customer: Option<&str>) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert_user(&Identity {
                id: "user_1".to_string(),
                email: "teacher@school.edu".to_string(),
                name: None,
            })
            .await
            .unwrap();
        if let Some(customer) = customer {
            store.set_stripe_customer_id("user_1", customer).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_portal_session_for_linked_customer() {
        let store = store_with_user(Some("cus_42")).await;
        let client = MockStripeClient::new();
        let manager = PortalManager::new(
            store,
            client.clone(),
            PortalConfig::new().configuration_id("bpc_123"),
        );

        let session = manager
            .create_portal_link("user_1", "https://lessonforge.app/settings")
            .await
            .unwrap();

        assert!(session.id.starts_with("bps_test_"));
        let requests = client.portal_requests();
        assert_eq!(requests[0].customer_id, "cus_42");
        assert_eq!(requests[0].configuration_id.as_deref(), Some("bpc_123"));
    }

    #[tokio::test]
    async fn test_portal_without_customer_is_not_found() {
        let store = store_with_user(None).await;
        let client = MockStripeClient::new();
        let manager = PortalManager::new(store, client.clone(), PortalConfig::new());

        let err = manager
            .create_portal_link("user_1", "https://lessonforge.app/settings")
            .await
            .unwrap_err();

        assert!(matches!(err, LessonForgeError::NotFound(_)));
        assert!(client.portal_requests().is_empty());
    }

    #[tokio::test]
    async fn test_portal_rejects_insecure_return_url() {
        let store = store_with_user(Some("cus_42")).await;
        let manager = PortalManager::new(store, MockStripeClient::new(), PortalConfig::new());

        let err = manager
            .create_portal_link("user_1", "http://lessonforge.app/settings")
            .await
            .unwrap_err();
        assert!(matches!(err, LessonForgeError::BadRequest(_)));
    }
}
