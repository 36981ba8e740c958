//! Consolidated Stripe client types.
//!
//! Individual traits remain separate so each manager asks only for what it
//! uses; [`FullStripeClient`] names the combination the server needs.

use super::checkout::StripeCheckoutClient;
use super::customer::StripeClient;
use super::portal::StripePortalClient;
use super::subscription::SubscriptionLookup;

/// A type that implements all Stripe client traits.
///
/// # Example
///
/// ```rust,ignore
/// let client: Arc<dyn FullStripeClient> = Arc::new(LiveStripeClient::new(key)?);
/// ```
pub trait FullStripeClient:
    StripeClient + StripeCheckoutClient + StripePortalClient + SubscriptionLookup
{
}

/// Blanket implementation for any type that implements all traits.
impl<T> FullStripeClient for T where
    T: StripeClient + StripeCheckoutClient + StripePortalClient + SubscriptionLookup
{
}

/// Mock Stripe client for testing that implements all client traits.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::super::checkout::{CheckoutSession, CreateCheckoutSessionRequest};
    use super::super::customer::CreateCustomerRequest;
    use super::super::portal::{CreatePortalSessionRequest, PortalSession};
    use super::super::subscription::SubscriptionRecord;
    use super::super::subscription::test::StaticSubscriptionLookup;
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, RwLock};

    /// In-process stand-in for Stripe.
    ///
    /// Records every create request for assertions; subscription lookups are
    /// served from an embedded [`StaticSubscriptionLookup`].
    #[derive(Clone, Default)]
    pub struct MockStripeClient {
        inner: Arc<MockStripeClientInner>,
    }

    #[derive(Default)]
    struct MockStripeClientInner {
        counter: AtomicU64,
        customers: RwLock<Vec<CreateCustomerRequest>>,
        checkouts: RwLock<Vec<CreateCheckoutSessionRequest>>,
        portals: RwLock<Vec<CreatePortalSessionRequest>>,
        subscriptions: StaticSubscriptionLookup,
    }

    impl MockStripeClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The subscription table backing `list_subscriptions`.
        pub fn subscriptions(&self) -> &StaticSubscriptionLookup {
            &self.inner.subscriptions
        }

        pub fn created_customers(&self) -> Vec<CreateCustomerRequest> {
            self.inner.customers.read().unwrap().clone()
        }

        pub fn checkout_requests(&self) -> Vec<CreateCheckoutSessionRequest> {
            self.inner.checkouts.read().unwrap().clone()
        }

        pub fn portal_requests(&self) -> Vec<CreatePortalSessionRequest> {
            self.inner.portals.read().unwrap().clone()
        }

        fn next_id(&self, prefix: &str) -> String {
            format!(
                "{}_test_{}",
                prefix,
                self.inner.counter.fetch_add(1, Ordering::SeqCst)
            )
        }
    }

    #[async_trait]
    impl StripeClient for MockStripeClient {
        async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String> {
            let id = self.next_id("cus");
            self.inner.customers.write().unwrap().push(request);
            Ok(id)
        }
    }

    #[async_trait]
    impl StripeCheckoutClient for MockStripeClient {
        async fn create_checkout_session(
            &self,
            request: CreateCheckoutSessionRequest,
        ) -> Result<CheckoutSession> {
            let id = self.next_id("cs");
            self.inner.checkouts.write().unwrap().push(request);
            Ok(CheckoutSession {
                url: format!("https://checkout.stripe.com/c/pay/{}", id),
                id,
            })
        }
    }

    #[async_trait]
    impl StripePortalClient for MockStripeClient {
        async fn create_portal_session(
            &self,
            request: CreatePortalSessionRequest,
        ) -> Result<PortalSession> {
            let id = self.next_id("bps");
            self.inner.portals.write().unwrap().push(request);
            Ok(PortalSession {
                url: format!("https://billing.stripe.com/p/session/{}", id),
                id,
            })
        }
    }

    #[async_trait]
    impl SubscriptionLookup for MockStripeClient {
        async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>> {
            self.inner.subscriptions.list_subscriptions(customer_id).await
        }
    }
}
