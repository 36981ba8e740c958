//! Lesson plan eligibility.
//!
//! Decides whether a user may generate another lesson plan in the current
//! billing period. The rules:
//!
//! - Only the first subscription Stripe returns is consulted.
//! - A subscription whose status is literally `active` grants the subscribed
//!   limit; any other status falls back to the free limit.
//! - Usage is counted inside the subscription's current period even when the
//!   subscription is not active. Without any subscription the window is the
//!   trailing free window ending now.
//! - When the quota is used up, subscribers are told their period end as the
//!   reset date; everyone else is told "now + free reset".
//!
//! Quota outcomes are values, not errors. Collaborator failures propagate.
//!
//! # Example
//!
//! ```rust,ignore
//! let evaluator = EligibilityEvaluator::new(stripe_client, store, QuotaPolicy::default());
//!
//! let decision = EligibilityDecision::from(&evaluator.evaluate(Some(&user)).await?);
//! if !decision.is_eligible {
//!     return Err(QuotaExhausted(decision));
//! }
//! ```

use super::error::BillingError;
use super::storage::{UsageStore, User, UserStore};
use super::subscription::{SubscriptionLookup, SubscriptionRecord};
use crate::auth::Identity;
use crate::config::QuotaPolicy;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which limit applies to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Subscribed,
}

impl Tier {
    #[must_use]
    pub fn limit(self, policy: &QuotaPolicy) -> u32 {
        match self {
            Self::Free => policy.free_limit,
            Self::Subscribed => policy.subscribed_limit,
        }
    }
}

/// The usage-counting window for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tier: Tier,
}

impl BillingWindow {
    /// Derive the window from the provider's subscription list.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Internal` if the first subscription carries
    /// period timestamps that cannot be represented, or the free window
    /// reaches past the representable range.
    pub fn resolve(
        subscriptions: &[SubscriptionRecord],
        now: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> Result<Self> {
        let Some(subscription) = subscriptions.first() else {
            let start = now
                .checked_sub_signed(policy.free_window())
                .ok_or_else(|| BillingError::Internal {
                    message: format!(
                        "free window of {} days is out of range",
                        policy.free_window_days
                    ),
                })?;
            return Ok(Self {
                start,
                end: now,
                tier: Tier::Free,
            });
        };

        let (Some(start), Some(end)) = (subscription.period_start(), subscription.period_end())
        else {
            return Err(BillingError::Internal {
                message: format!(
                    "subscription {} has an out-of-range billing period",
                    subscription.id
                ),
            }
            .into());
        };

        let tier = if subscription.is_active() {
            Tier::Subscribed
        } else {
            Tier::Free
        };

        Ok(Self { start, end, tier })
    }
}

/// Outcome of an eligibility evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    /// No identity, or no user record for it.
    Unauthenticated,
    Eligible {
        tier: Tier,
        used: u32,
        limit: u32,
        remaining: u32,
    },
    Exhausted {
        tier: Tier,
        used: u32,
        limit: u32,
        resets_at: DateTime<Utc>,
    },
}

impl Eligibility {
    /// Apply the tier limit to a usage count.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Internal` if the free-tier reset date is out of
    /// the representable range.
    pub fn from_usage(
        window: &BillingWindow,
        used: u32,
        now: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> Result<Self> {
        let limit = window.tier.limit(policy);
        let remaining = limit.saturating_sub(used);

        if remaining > 0 {
            return Ok(Self::Eligible {
                tier: window.tier,
                used,
                limit,
                remaining,
            });
        }

        let resets_at = match window.tier {
            Tier::Subscribed => window.end,
            Tier::Free => now
                .checked_add_signed(policy.free_reset())
                .ok_or_else(|| BillingError::Internal {
                    message: format!(
                        "free reset of {} days is out of range",
                        policy.free_reset_days
                    ),
                })?,
        };

        Ok(Self::Exhausted {
            tier: window.tier,
            used,
            limit,
            resets_at,
        })
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        match self {
            Self::Eligible { remaining, .. } => *remaining,
            Self::Unauthenticated | Self::Exhausted { .. } => 0,
        }
    }

    /// User-facing explanation of the outcome.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Unauthenticated => "Please sign in to generate lesson plans.".to_string(),
            Self::Eligible {
                tier: Tier::Subscribed,
                remaining,
                ..
            } => format!(
                "You have {} lesson plan {} remaining this billing period.",
                remaining,
                generations(*remaining)
            ),
            Self::Eligible {
                tier: Tier::Free,
                remaining,
                ..
            } => format!(
                "You have {} free lesson plan {} remaining. Upgrade to Pro for more.",
                remaining,
                generations(*remaining)
            ),
            Self::Exhausted {
                tier: Tier::Subscribed,
                limit,
                resets_at,
                ..
            } => format!(
                "You have used all {} lesson plan {} for this billing period. Your quota resets on {}.",
                limit,
                generations(*limit),
                format_reset_date(*resets_at)
            ),
            Self::Exhausted {
                tier: Tier::Free,
                limit,
                resets_at,
                ..
            } => format!(
                "You have used all {} free lesson plan {}. Your quota resets on {}. Upgrade to Pro for more.",
                limit,
                generations(*limit),
                format_reset_date(*resets_at)
            ),
        }
    }
}

fn generations(n: u32) -> &'static str {
    if n == 1 { "generation" } else { "generations" }
}

/// Render a reset date as e.g. `April 1, 2026`.
#[must_use]
pub fn format_reset_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

/// Wire form of an [`Eligibility`]. Built fresh per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityDecision {
    pub is_eligible: bool,
    pub message: String,
    pub remaining_generations: u32,
}

impl From<&Eligibility> for EligibilityDecision {
    fn from(eligibility: &Eligibility) -> Self {
        Self {
            is_eligible: eligibility.is_eligible(),
            message: eligibility.message(),
            remaining_generations: eligibility.remaining(),
        }
    }
}

impl From<Eligibility> for EligibilityDecision {
    fn from(eligibility: Eligibility) -> Self {
        Self::from(&eligibility)
    }
}

/// Evaluates eligibility for an already-resolved user.
///
/// Read-only: neither collaborator is written to.
pub struct EligibilityEvaluator<S: SubscriptionLookup, U: UsageStore> {
    subscriptions: S,
    usage: U,
    policy: QuotaPolicy,
}

impl<S: SubscriptionLookup, U: UsageStore> EligibilityEvaluator<S, U> {
    #[must_use]
    pub fn new(subscriptions: S, usage: U, policy: QuotaPolicy) -> Self {
        Self {
            subscriptions,
            usage,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub(crate) fn usage_store(&self) -> &U {
        &self.usage
    }

    pub async fn evaluate(&self, user: Option<&User>) -> Result<Eligibility> {
        self.evaluate_at(user, Utc::now()).await
    }

    /// Evaluate as of `now`.
    ///
    /// `None` short-circuits to [`Eligibility::Unauthenticated`] without
    /// contacting either collaborator. A user with no Stripe customer is
    /// treated as having no subscriptions.
    pub async fn evaluate_at(&self, user: Option<&User>, now: DateTime<Utc>) -> Result<Eligibility> {
        match user {
            Some(user) => Ok(self.assess_at(user, now).await?.eligibility),
            None => Ok(Eligibility::Unauthenticated),
        }
    }

    pub(crate) async fn assess_at(&self, user: &User, now: DateTime<Utc>) -> Result<Assessment> {
        let subscriptions = match user.stripe_customer_id.as_deref() {
            Some(customer_id) => self.subscriptions.list_subscriptions(customer_id).await?,
            None => Vec::new(),
        };

        if subscriptions.len() > 1 {
            tracing::debug!(
                target: "lessonforge::billing",
                user_id = %user.id,
                count = subscriptions.len(),
                "Multiple subscriptions found, using the first"
            );
        }

        let window = BillingWindow::resolve(&subscriptions, now, &self.policy)?;
        let used = self
            .usage
            .count_usage_events(&user.id, window.start, window.end)
            .await?;

        let eligibility = Eligibility::from_usage(&window, used, now, &self.policy)?;

        tracing::debug!(
            target: "lessonforge::billing",
            user_id = %user.id,
            tier = ?window.tier,
            used,
            remaining = eligibility.remaining(),
            "Evaluated lesson plan eligibility"
        );

        Ok(Assessment {
            window,
            used,
            eligibility,
        })
    }
}

/// An evaluation together with the window it was computed over.
#[derive(Debug, Clone)]
pub(crate) struct Assessment {
    pub window: BillingWindow,
    pub used: u32,
    pub eligibility: Eligibility,
}

/// Resolves the caller's user record, then evaluates.
pub struct EligibilityService<US: UserStore, S: SubscriptionLookup, U: UsageStore> {
    users: US,
    evaluator: EligibilityEvaluator<S, U>,
}

impl<US: UserStore, S: SubscriptionLookup, U: UsageStore> EligibilityService<US, S, U> {
    #[must_use]
    pub fn new(users: US, evaluator: EligibilityEvaluator<S, U>) -> Self {
        Self { users, evaluator }
    }

    pub fn users(&self) -> &US {
        &self.users
    }

    pub fn evaluator(&self) -> &EligibilityEvaluator<S, U> {
        &self.evaluator
    }

    /// Eligibility for the given identity. A missing identity or a missing
    /// user record both yield `Unauthenticated`.
    pub async fn eligibility(&self, identity: Option<&Identity>) -> Result<Eligibility> {
        self.eligibility_at(identity, Utc::now()).await
    }

    pub async fn eligibility_at(
        &self,
        identity: Option<&Identity>,
        now: DateTime<Utc>,
    ) -> Result<Eligibility> {
        let Some(identity) = identity else {
            return Ok(Eligibility::Unauthenticated);
        };

        let user = self.users.get_user(&identity.id).await?;
        self.evaluator.evaluate_at(user.as_ref(), now).await
    }

    pub async fn check_eligibility(&self, identity: Option<&Identity>) -> Result<EligibilityDecision> {
        Ok(self.eligibility(identity).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::storage::test::InMemoryStore;
    use crate::billing::subscription::test::{StaticSubscriptionLookup, subscription};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap()
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
        )
    }

    fn user(customer: Option<&str>) -> User {
        User {
            id: "user_1".to_string(),
            email: "teacher@school.edu".to_string(),
            name: None,
            stripe_customer_id: customer.map(String::from),
        }
    }

    fn evaluator(
        lookup: &StaticSubscriptionLookup,
        store: &InMemoryStore,
    ) -> EligibilityEvaluator<StaticSubscriptionLookup, InMemoryStore> {
        EligibilityEvaluator::new(lookup.clone(), store.clone(), QuotaPolicy::default())
    }

    #[test]
    fn test_window_without_subscription_is_trailing_thirty_days() {
        let window = BillingWindow::resolve(&[], now(), &QuotaPolicy::default()).unwrap();
        assert_eq!(window.tier, Tier::Free);
        assert_eq!(window.end, now());
        assert_eq!(window.start, now() - Duration::days(30));
    }

    #[test]
    fn test_window_uses_first_subscription_only() {
        let (start, end) = period();
        let subs = vec![
            subscription("canceled", start, end),
            subscription("active", start - Duration::days(60), end + Duration::days(60)),
        ];
        let window = BillingWindow::resolve(&subs, now(), &QuotaPolicy::default()).unwrap();
        assert_eq!(window.tier, Tier::Free);
        assert_eq!((window.start, window.end), (start, end));
    }

    #[test]
    fn test_window_rejects_out_of_range_period() {
        let (start, end) = period();
        let mut sub = subscription("active", start, end);
        sub.current_period_end = i64::MAX;
        assert!(BillingWindow::resolve(&[sub], now(), &QuotaPolicy::default()).is_err());
    }

    #[test]
    fn test_oversized_free_window_is_an_error() {
        let policy = QuotaPolicy {
            free_window_days: u32::MAX,
            ..QuotaPolicy::default()
        };
        let err = BillingWindow::resolve(&[], now(), &policy).unwrap_err();
        assert!(matches!(err, crate::error::LessonForgeError::Internal(_)));
    }

    #[test]
    fn test_oversized_free_reset_is_an_error() {
        let policy = QuotaPolicy {
            free_reset_days: u32::MAX,
            ..QuotaPolicy::default()
        };
        let window = BillingWindow {
            start: now() - Duration::days(30),
            end: now(),
            tier: Tier::Free,
        };
        assert!(Eligibility::from_usage(&window, 10, now(), &policy).is_err());
        // Still eligible: the reset date is never computed.
        assert!(Eligibility::from_usage(&window, 3, now(), &policy).is_ok());
    }

    #[test]
    fn test_exhausted_free_resets_one_day_after_now() {
        let window = BillingWindow {
            start: now() - Duration::days(30),
            end: now(),
            tier: Tier::Free,
        };
        let eligibility =
            Eligibility::from_usage(&window, 10, now(), &QuotaPolicy::default()).unwrap();
        assert_eq!(
            eligibility,
            Eligibility::Exhausted {
                tier: Tier::Free,
                used: 10,
                limit: 10,
                resets_at: now() + Duration::days(1),
            }
        );
    }

    #[test]
    fn test_over_limit_usage_saturates() {
        let (start, end) = period();
        let window = BillingWindow {
            start,
            end,
            tier: Tier::Subscribed,
        };
        let eligibility =
            Eligibility::from_usage(&window, 45, now(), &QuotaPolicy::default()).unwrap();
        assert_eq!(eligibility.remaining(), 0);
        assert!(!eligibility.is_eligible());
    }

    #[test]
    fn test_messages() {
        let decision = EligibilityDecision::from(&Eligibility::Unauthenticated);
        assert_eq!(decision.message, "Please sign in to generate lesson plans.");
        assert!(!decision.is_eligible);
        assert_eq!(decision.remaining_generations, 0);

        let eligible = Eligibility::Eligible {
            tier: Tier::Free,
            used: 9,
            limit: 10,
            remaining: 1,
        };
        assert_eq!(
            eligible.message(),
            "You have 1 free lesson plan generation remaining. Upgrade to Pro for more."
        );

        let exhausted = Eligibility::Exhausted {
            tier: Tier::Subscribed,
            used: 30,
            limit: 30,
            resets_at: period().1,
        };
        assert_eq!(
            exhausted.message(),
            "You have used all 30 lesson plan generations for this billing period. Your quota resets on April 1, 2026."
        );
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let decision = EligibilityDecision {
            is_eligible: true,
            message: "ok".to_string(),
            remaining_generations: 7,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"isEligible": true, "message": "ok", "remainingGenerations": 7})
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_skips_collaborators() {
        let lookup = StaticSubscriptionLookup::new();
        let store = InMemoryStore::new();

        let eligibility = evaluator(&lookup, &store)
            .evaluate_at(None, now())
            .await
            .unwrap();

        assert_eq!(eligibility, Eligibility::Unauthenticated);
        assert_eq!(lookup.call_count(), 0);
        assert_eq!(store.usage_query_count(), 0);
    }

    #[tokio::test]
    async fn test_user_without_customer_skips_lookup() {
        let lookup = StaticSubscriptionLookup::new();
        let store = InMemoryStore::new();
        store.seed_usage("user_1", now() - Duration::days(2), 3);

        let eligibility = evaluator(&lookup, &store)
            .evaluate_at(Some(&user(None)), now())
            .await
            .unwrap();

        assert_eq!(eligibility.remaining(), 7);
        assert_eq!(lookup.call_count(), 0);
    }

    #[tokio::test]
    async fn test_free_window_excludes_older_usage() {
        let lookup = StaticSubscriptionLookup::new();
        let store = InMemoryStore::new();
        store.seed_usage("user_1", now() - Duration::days(31), 10);
        store.seed_usage("user_1", now() - Duration::days(29), 4);

        let eligibility = evaluator(&lookup, &store)
            .evaluate_at(Some(&user(None)), now())
            .await
            .unwrap();

        assert_eq!(eligibility.remaining(), 6);
    }

    #[tokio::test]
    async fn test_subscription_lookup_failure_propagates() {
        let lookup = StaticSubscriptionLookup::new();
        lookup.fail_lookups(true);
        let store = InMemoryStore::new();

        let result = evaluator(&lookup, &store)
            .evaluate_at(Some(&user(Some("cus_1"))), now())
            .await;

        assert!(result.is_err());
        assert_eq!(store.usage_query_count(), 0);
    }

    #[tokio::test]
    async fn test_service_missing_user_is_unauthenticated() {
        let lookup = StaticSubscriptionLookup::new();
        let store = InMemoryStore::new();
        let service = EligibilityService::new(store.clone(), evaluator(&lookup, &store));

        let identity = Identity {
            id: "ghost".to_string(),
            email: "ghost@school.edu".to_string(),
            name: None,
        };
        let decision = service.check_eligibility(Some(&identity)).await.unwrap();

        assert!(!decision.is_eligible);
        assert_eq!(decision.message, "Please sign in to generate lesson plans.");
        assert_eq!(store.usage_query_count(), 0);
    }
}
