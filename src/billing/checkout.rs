//! Stripe Checkout session management.
//!
//! Creates Checkout sessions that upgrade a user to the Pro plan.

use super::customer::{CustomerManager, StripeClient};
use super::storage::{User, UserStore};
use super::validation::validate_redirect_url;
use crate::config::BillingConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Checkout session management.
pub struct CheckoutManager<US: UserStore, C: StripeClient + StripeCheckoutClient> {
    customer_manager: CustomerManager<US, C>,
    client: C,
    config: CheckoutConfig,
}

impl<US: UserStore, C: StripeClient + StripeCheckoutClient + Clone> CheckoutManager<US, C> {
    #[must_use]
    pub fn new(users: US, client: C, config: CheckoutConfig) -> Self {
        Self {
            customer_manager: CustomerManager::new(users, client.clone()),
            client,
            config,
        }
    }

    /// Create a Pro subscription checkout session for the user.
    ///
    /// Links a Stripe customer first if the user has none.
    pub async fn create_checkout_link(
        &self,
        user: &User,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        self.config.validate_redirect_url(success_url)?;
        self.config.validate_redirect_url(cancel_url)?;

        let customer_id = self.customer_manager.get_or_create_customer(user).await?;

        let session = self
            .client
            .create_checkout_session(CreateCheckoutSessionRequest {
                customer_id,
                price_id: self.config.pro_price_id.clone(),
                quantity: 1,
                success_url: success_url.to_string(),
                cancel_url: cancel_url.to_string(),
                allow_promotion_codes: self.config.allow_promotion_codes,
                metadata: CheckoutMetadata {
                    user_id: user.id.clone(),
                },
            })
            .await?;

        tracing::info!(
            target: "lessonforge::billing",
            user_id = %user.id,
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(session)
    }
}

/// Configuration for checkout sessions.
#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    /// Stripe price ID of the Pro plan.
    pub pro_price_id: String,
    pub allow_promotion_codes: bool,
    /// Allowed redirect hosts. Empty allows any HTTPS host.
    pub allowed_redirect_domains: Vec<String>,
}

impl CheckoutConfig {
    #[must_use]
    pub fn new(pro_price_id: impl Into<String>) -> Self {
        Self {
            pro_price_id: pro_price_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_billing_config(config: &BillingConfig) -> Self {
        Self {
            pro_price_id: config.pro_price_id.clone(),
            allow_promotion_codes: true,
            allowed_redirect_domains: config.allowed_redirect_domains.clone(),
        }
    }

    #[must_use]
    pub fn allow_promotion_codes(mut self, allow: bool) -> Self {
        self.allow_promotion_codes = allow;
        self
    }

    #[must_use]
    pub fn allowed_redirect_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_redirect_domains = domains;
        self
    }

    /// Check a success or cancel URL against the redirect policy.
    pub fn validate_redirect_url(&self, url: &str) -> Result<()> {
        validate_redirect_url(url, &self.allowed_redirect_domains)
    }
}

/// Checkout session response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// URL to redirect the customer to.
    pub url: String,
}

/// Metadata for checkout sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub user_id: String,
}

/// Request to create a subscription-mode Stripe checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutSessionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
    pub allow_promotion_codes: bool,
    pub metadata: CheckoutMetadata,
}

/// Trait for Stripe checkout operations.
#[async_trait]
pub trait StripeCheckoutClient: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession>;
}

#[async_trait]
impl<T: StripeCheckoutClient + ?Sized> StripeCheckoutClient for Arc<T> {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        (**self).create_checkout_session(request).await
    }
}
