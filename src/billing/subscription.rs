//! Subscription lookup against the payment provider.
//!
//! Subscriptions are read live from Stripe on every evaluation; nothing is
//! cached locally.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Status string Stripe reports for a paid, current subscription.
pub const ACTIVE_STATUS: &str = "active";

/// A subscription as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    /// Provider status string (`active`, `trialing`, `canceled`, ...).
    pub status: String,
    /// Unix timestamp (seconds).
    pub current_period_start: i64,
    /// Unix timestamp (seconds).
    pub current_period_end: i64,
    /// Unix timestamp (seconds).
    pub created: i64,
}

impl SubscriptionRecord {
    /// Only the literal `active` status counts; `trialing` and `past_due` do not.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }

    /// Start of the current period, `None` if the timestamp is out of range.
    #[must_use]
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.current_period_start, 0)
    }

    /// End of the current period, `None` if the timestamp is out of range.
    #[must_use]
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.current_period_end, 0)
    }
}

/// Lists a customer's subscriptions.
#[async_trait]
pub trait SubscriptionLookup: Send + Sync {
    /// All subscriptions for the customer in provider order (newest first
    /// for Stripe), regardless of status.
    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>>;
}

#[async_trait]
impl<T: SubscriptionLookup + ?Sized> SubscriptionLookup for Arc<T> {
    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>> {
        (**self).list_subscriptions(customer_id).await
    }
}

#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use crate::error::LessonForgeError;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Fixed subscription table keyed by customer ID.
    #[derive(Default, Clone)]
    pub struct StaticSubscriptionLookup {
        inner: Arc<StaticSubscriptionLookupInner>,
    }

    #[derive(Default)]
    struct StaticSubscriptionLookupInner {
        subscriptions: RwLock<HashMap<String, Vec<SubscriptionRecord>>>,
        calls: AtomicU64,
        fail: AtomicBool,
    }

    impl StaticSubscriptionLookup {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Append a subscription to the customer's list.
        pub fn add_subscription(&self, customer_id: &str, record: SubscriptionRecord) {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .entry(customer_id.to_string())
                .or_default()
                .push(record);
        }

        /// Number of `list_subscriptions` calls made so far.
        pub fn call_count(&self) -> u64 {
            self.inner.calls.load(Ordering::SeqCst)
        }

        /// Make every lookup fail, simulating a Stripe outage.
        pub fn fail_lookups(&self, fail: bool) {
            self.inner.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SubscriptionLookup for StaticSubscriptionLookup {
        async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>> {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail.load(Ordering::SeqCst) {
                return Err(LessonForgeError::service_unavailable("Stripe unreachable"));
            }
            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .get(customer_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Build a subscription record spanning `[start, end]`.
    pub fn subscription(
        status: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SubscriptionRecord {
        SubscriptionRecord {
            id: format!("sub_{}", start.timestamp()),
            status: status.to_string(),
            current_period_start: start.timestamp(),
            current_period_end: end.timestamp(),
            created: start.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::{StaticSubscriptionLookup, subscription};
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_only_literal_active_counts() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();

        assert!(subscription("active", start, end).is_active());
        assert!(!subscription("trialing", start, end).is_active());
        assert!(!subscription("canceled", start, end).is_active());
        assert!(!subscription("Active", start, end).is_active());
    }

    #[test]
    fn test_period_conversion() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 4, 1, 12, 30, 0).unwrap();
        let record = subscription("active", start, end);

        assert_eq!(record.period_start(), Some(start));
        assert_eq!(record.period_end(), Some(end));

        let broken = SubscriptionRecord {
            current_period_end: i64::MAX,
            ..record
        };
        assert_eq!(broken.period_end(), None);
    }

    #[tokio::test]
    async fn test_static_lookup_counts_calls() {
        let lookup = StaticSubscriptionLookup::new();
        let now = Utc::now();
        lookup.add_subscription("cus_1", subscription("active", now, now));

        assert_eq!(lookup.list_subscriptions("cus_1").await.unwrap().len(), 1);
        assert!(lookup.list_subscriptions("cus_2").await.unwrap().is_empty());
        assert_eq!(lookup.call_count(), 2);

        lookup.fail_lookups(true);
        assert!(lookup.list_subscriptions("cus_1").await.is_err());
    }
}
