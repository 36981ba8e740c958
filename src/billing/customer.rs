//! Customer management for Stripe billing.
//!
//! Handles creating Stripe customers and linking them to users.

use super::storage::{User, UserStore};
use super::validation::validate_user_id;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Customer management operations.
pub struct CustomerManager<US: UserStore, C: StripeClient> {
    users: US,
    client: C,
}

impl<US: UserStore, C: StripeClient> CustomerManager<US, C> {
    #[must_use]
    pub fn new(users: US, client: C) -> Self {
        Self { users, client }
    }

    /// Get the Stripe customer ID for a user, creating one if needed.
    ///
    /// The stored record is re-read first so a customer linked by a
    /// concurrent request is reused rather than duplicated.
    pub async fn get_or_create_customer(&self, user: &User) -> Result<String> {
        validate_user_id(&user.id)?;

        if let Some(customer_id) = &user.stripe_customer_id {
            return Ok(customer_id.clone());
        }
        if let Some(customer_id) = self.get_customer_id(&user.id).await? {
            return Ok(customer_id);
        }

        let customer_id = self
            .client
            .create_customer(CreateCustomerRequest {
                email: user.email.clone(),
                name: user.name.clone(),
                metadata: CustomerMetadata {
                    user_id: user.id.clone(),
                },
            })
            .await?;

        self.users
            .set_stripe_customer_id(&user.id, &customer_id)
            .await?;

        tracing::info!(
            target: "lessonforge::billing",
            user_id = %user.id,
            customer_id = %customer_id,
            "Linked new Stripe customer"
        );

        Ok(customer_id)
    }

    /// Get the Stripe customer ID for a user (without creating).
    pub async fn get_customer_id(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .users
            .get_user(user_id)
            .await?
            .and_then(|user| user.stripe_customer_id))
    }
}

/// Request to create a Stripe customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub name: Option<String>,
    pub metadata: CustomerMetadata,
}

/// Metadata attached to Stripe customers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerMetadata {
    pub user_id: String,
}

/// Stripe customer operations.
#[async_trait]
pub trait StripeClient: Send + Sync {
    /// Create a new customer in Stripe, returning its ID.
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String>;
}

#[async_trait]
impl<T: StripeClient + ?Sized> StripeClient for Arc<T> {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String> {
        (**self).create_customer(request).await
    }
}
