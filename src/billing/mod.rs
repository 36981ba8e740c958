//! Subscription-gated lesson plan quota and Stripe billing flows.
//!
//! Subscribers get a monthly allowance aligned to their Stripe billing
//! period; everyone else gets a smaller allowance over a rolling window.
//!
//! # Example
//!
//! ```rust,ignore
//! use lessonforge::billing::{
//!     EligibilityEvaluator, EligibilityService, LessonPlanQuota, SeaOrmStore,
//! };
//!
//! let store = SeaOrmStore::new(db);
//! let evaluator = EligibilityEvaluator::new(stripe.clone(), store.clone(), config.quota.clone());
//! let quota = LessonPlanQuota::new(EligibilityService::new(store, evaluator));
//!
//! match quota.consume(identity.as_ref()).await? {
//!     Consumption::Consumed(_) => generate_plan().await?,
//!     Consumption::Denied(eligibility) => return Ok(eligibility.message()),
//! }
//! ```

pub mod checkout;
pub mod client;
pub mod customer;
pub mod eligibility;
pub mod error;
pub mod live_client;
pub mod portal;
#[cfg(feature = "database")]
pub mod sea_orm_store;
pub mod storage;
pub mod subscription;
pub mod usage;
pub mod validation;

pub use checkout::{
    CheckoutConfig, CheckoutManager, CheckoutMetadata, CheckoutSession,
    CreateCheckoutSessionRequest, StripeCheckoutClient,
};
pub use client::FullStripeClient;
pub use customer::{CreateCustomerRequest, CustomerManager, CustomerMetadata, StripeClient};
pub use eligibility::{
    BillingWindow, Eligibility, EligibilityDecision, EligibilityEvaluator, EligibilityService,
    Tier, format_reset_date,
};
pub use error::BillingError;
pub use live_client::{InvalidApiKeyError, LiveStripeClient, LiveStripeClientConfig};
pub use portal::{CreatePortalSessionRequest, PortalConfig, PortalManager, PortalSession, StripePortalClient};
#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmStore;
pub use storage::{UsageStore, User, UserStore};
pub use subscription::{ACTIVE_STATUS, SubscriptionLookup, SubscriptionRecord};
pub use usage::{Consumption, LessonPlanQuota};
pub use validation::{validate_redirect_url, validate_user_id};

#[cfg(any(test, feature = "test-billing"))]
pub use client::test::MockStripeClient;
#[cfg(any(test, feature = "test-billing"))]
pub use storage::test::InMemoryStore;
#[cfg(any(test, feature = "test-billing"))]
pub use subscription::test::{StaticSubscriptionLookup, subscription};
