//! Storage traits for users and lesson plan usage.
//!
//! Implement these traits to persist billing state to your database.
//! [`SeaOrmStore`](super::SeaOrmStore) is the production implementation;
//! an in-memory implementation is provided for testing.

use crate::auth::Identity;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A persisted user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier assigned by the identity provider.
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    /// Stripe customer linked on first checkout.
    pub stripe_customer_id: Option<String>,
}

impl User {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            stripe_customer_id: None,
        }
    }
}

/// Persistence for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Create the user on first authenticated interaction, or refresh the
    /// profile fields of an existing one.
    ///
    /// An existing `stripe_customer_id` is never cleared.
    async fn upsert_user(&self, identity: &Identity) -> Result<User>;

    /// Link a user to a Stripe customer.
    async fn set_stripe_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()>;
}

/// Append-only log of lesson plan generations.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Count generations with `window_start <= created_at <= window_end`.
    async fn count_usage_events(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<u32>;

    /// Record one generation at `at`.
    async fn record_usage_event(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        (**self).get_user(user_id).await
    }

    async fn upsert_user(&self, identity: &Identity) -> Result<User> {
        (**self).upsert_user(identity).await
    }

    async fn set_stripe_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()> {
        (**self).set_stripe_customer_id(user_id, customer_id).await
    }
}

#[async_trait]
impl<T: UsageStore + ?Sized> UsageStore for Arc<T> {
    async fn count_usage_events(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<u32> {
        (**self)
            .count_usage_events(user_id, window_start, window_end)
            .await
    }

    async fn record_usage_event(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        (**self).record_usage_event(user_id, at).await
    }
}

#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use crate::error::LessonForgeError;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// In-memory user and usage store for testing.
    ///
    /// Clones share the same underlying data.
    #[derive(Default, Clone)]
    pub struct InMemoryStore {
        inner: Arc<InMemoryStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryStoreInner {
        users: RwLock<HashMap<String, User>>,
        usage: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
        usage_queries: AtomicU64,
        fail_usage_queries: AtomicBool,
    }

    impl InMemoryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Insert or replace a user record.
        pub fn insert_user(&self, user: User) {
            self.inner
                .users
                .write()
                .unwrap()
                .insert(user.id.clone(), user);
        }

        /// Seed `count` generations for a user, all at `at`.
        pub fn seed_usage(&self, user_id: &str, at: DateTime<Utc>, count: usize) {
            self.inner
                .usage
                .write()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .extend(std::iter::repeat_n(at, count));
        }

        /// All recorded generation timestamps for a user.
        pub fn usage_events(&self, user_id: &str) -> Vec<DateTime<Utc>> {
            self.inner
                .usage
                .read()
                .unwrap()
                .get(user_id)
                .cloned()
                .unwrap_or_default()
        }

        /// Number of `count_usage_events` calls made so far.
        pub fn usage_query_count(&self) -> u64 {
            self.inner.usage_queries.load(Ordering::SeqCst)
        }

        /// Make `count_usage_events` fail, simulating a database outage.
        pub fn fail_usage_queries(&self, fail: bool) {
            self.inner.fail_usage_queries.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UserStore for InMemoryStore {
        async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
            Ok(self.inner.users.read().unwrap().get(user_id).cloned())
        }

        async fn upsert_user(&self, identity: &Identity) -> Result<User> {
            let mut users = self.inner.users.write().unwrap();
            let user = users
                .entry(identity.id.clone())
                .and_modify(|user| {
                    user.email = identity.email.clone();
                    user.name = identity.name.clone();
                })
                .or_insert_with(|| User::from_identity(identity));
            Ok(user.clone())
        }

        async fn set_stripe_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()> {
            let mut users = self.inner.users.write().unwrap();
            let user = users
                .get_mut(user_id)
                .ok_or_else(|| LessonForgeError::not_found(format!("User {}", user_id)))?;
            user.stripe_customer_id = Some(customer_id.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl UsageStore for InMemoryStore {
        async fn count_usage_events(
            &self,
            user_id: &str,
            window_start: DateTime<Utc>,
            window_end: DateTime<Utc>,
        ) -> Result<u32> {
            self.inner.usage_queries.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_usage_queries.load(Ordering::SeqCst) {
                return Err(LessonForgeError::service_unavailable("usage store offline"));
            }

            let usage = self.inner.usage.read().unwrap();
            let count = usage
                .get(user_id)
                .map(|events| {
                    events
                        .iter()
                        .filter(|at| **at >= window_start && **at <= window_end)
                        .count()
                })
                .unwrap_or(0);
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        }

        async fn record_usage_event(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
            self.inner
                .usage
                .write()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .push(at);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::InMemoryStore;
    use super::*;
    use chrono::{Duration, TimeZone};

    fn identity(name: Option<&str>) -> Identity {
        Identity {
            id: "user_1".to_string(),
            email: "teacher@school.edu".to_string(),
            name: name.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates_profile() {
        let store = InMemoryStore::new();

        let created = store.upsert_user(&identity(None)).await.unwrap();
        assert_eq!(created.stripe_customer_id, None);

        store
            .set_stripe_customer_id("user_1", "cus_123")
            .await
            .unwrap();

        let updated = store.upsert_user(&identity(Some("Ms. Frizzle"))).await.unwrap();
        assert_eq!(updated.name.as_deref(), Some("Ms. Frizzle"));
        assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_123"));
    }

    #[tokio::test]
    async fn test_set_customer_for_unknown_user_fails() {
        let store = InMemoryStore::new();
        assert!(store.set_stripe_customer_id("ghost", "cus_1").await.is_err());
    }

    #[tokio::test]
    async fn test_usage_window_is_inclusive() {
        let store = InMemoryStore::new();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();

        store.record_usage_event("user_1", start).await.unwrap();
        store.record_usage_event("user_1", end).await.unwrap();
        store
            .record_usage_event("user_1", start - Duration::seconds(1))
            .await
            .unwrap();
        store
            .record_usage_event("user_1", end + Duration::seconds(1))
            .await
            .unwrap();
        store.record_usage_event("user_2", start).await.unwrap();

        let count = store.count_usage_events("user_1", start, end).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.usage_query_count(), 1);
    }

    #[tokio::test]
    async fn test_arc_store_delegates() {
        let store: Arc<dyn UsageStore> = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        store.record_usage_event("user_1", now).await.unwrap();
        assert_eq!(store.count_usage_events("user_1", now, now).await.unwrap(), 1);
    }
}
