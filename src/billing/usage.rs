//! Consuming lesson plan generations.
//!
//! [`LessonPlanQuota::consume`] is what the generation endpoint calls before
//! producing a plan: it evaluates eligibility and, only when the caller has
//! generations left, appends one usage event.
//!
//! The check and the append are two separate store calls. Two concurrent
//! requests for the same user can both pass the check at one remaining
//! generation; the overrun is bounded by request concurrency.

use super::eligibility::{Eligibility, EligibilityDecision, EligibilityService};
use super::storage::{UsageStore, UserStore};
use super::subscription::SubscriptionLookup;
use crate::auth::Identity;
use crate::error::Result;
use chrono::{DateTime, Utc};

/// Result of a consumption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumption {
    /// One generation was recorded. Carries the eligibility after recording.
    Consumed(Eligibility),
    /// Nothing was recorded. Carries the eligibility that blocked it.
    Denied(Eligibility),
}

impl Consumption {
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed(_))
    }

    #[must_use]
    pub fn eligibility(&self) -> &Eligibility {
        match self {
            Self::Consumed(e) | Self::Denied(e) => e,
        }
    }

    #[must_use]
    pub fn decision(&self) -> EligibilityDecision {
        self.eligibility().into()
    }
}

/// Gatekeeper for lesson plan generation.
pub struct LessonPlanQuota<US: UserStore, S: SubscriptionLookup, U: UsageStore> {
    service: EligibilityService<US, S, U>,
}

impl<US: UserStore, S: SubscriptionLookup, U: UsageStore> LessonPlanQuota<US, S, U> {
    #[must_use]
    pub fn new(service: EligibilityService<US, S, U>) -> Self {
        Self { service }
    }

    /// The read-only eligibility view over the same collaborators.
    pub fn service(&self) -> &EligibilityService<US, S, U> {
        &self.service
    }

    pub async fn consume(&self, identity: Option<&Identity>) -> Result<Consumption> {
        self.consume_at(identity, Utc::now()).await
    }

    /// Consume one generation as of `now`.
    pub async fn consume_at(
        &self,
        identity: Option<&Identity>,
        now: DateTime<Utc>,
    ) -> Result<Consumption> {
        let Some(identity) = identity else {
            return Ok(Consumption::Denied(Eligibility::Unauthenticated));
        };
        let Some(user) = self.service.users().get_user(&identity.id).await? else {
            return Ok(Consumption::Denied(Eligibility::Unauthenticated));
        };

        let evaluator = self.service.evaluator();
        let assessment = evaluator.assess_at(&user, now).await?;
        if !assessment.eligibility.is_eligible() {
            tracing::info!(
                target: "lessonforge::billing",
                user_id = %user.id,
                used = assessment.used,
                "Lesson plan generation denied, quota exhausted"
            );
            return Ok(Consumption::Denied(assessment.eligibility));
        }

        evaluator.usage_store().record_usage_event(&user.id, now).await?;

        // An event recorded after a lapsed period ends is not counted by the
        // next check either.
        let window = &assessment.window;
        let after = if window.start <= now && now <= window.end {
            Eligibility::from_usage(
                window,
                assessment.used.saturating_add(1),
                now,
                evaluator.policy(),
            )?
        } else {
            assessment.eligibility
        };

        tracing::info!(
            target: "lessonforge::billing",
            user_id = %user.id,
            remaining = after.remaining(),
            "Lesson plan generation recorded"
        );

        Ok(Consumption::Consumed(after))
    }
}
