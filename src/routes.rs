//! HTTP surface for the dashboard's billing page and the generation flow.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::auth::{CurrentIdentity, Identity, IdentityProvider};
use crate::billing::{
    CheckoutConfig, CheckoutManager, CheckoutSession, Consumption, EligibilityDecision,
    EligibilityEvaluator, EligibilityService, FullStripeClient, LessonPlanQuota, PortalConfig,
    PortalManager, PortalSession, UsageStore, User, UserStore,
};
use crate::config::BillingConfig;
use crate::error::{LessonForgeError, Result};

pub type SharedUserStore = Arc<dyn UserStore>;
pub type SharedUsageStore = Arc<dyn UsageStore>;
pub type SharedStripeClient = Arc<dyn FullStripeClient>;

type Quota = LessonPlanQuota<SharedUserStore, SharedStripeClient, SharedUsageStore>;

/// Shared services behind the billing routes.
#[derive(Clone)]
pub struct AppState {
    quota: Arc<Quota>,
    checkout: Arc<CheckoutManager<SharedUserStore, SharedStripeClient>>,
    portal: Arc<PortalManager<SharedUserStore, SharedStripeClient>>,
}

impl AppState {
    pub fn new(
        users: SharedUserStore,
        usage: SharedUsageStore,
        stripe: SharedStripeClient,
        config: &BillingConfig,
    ) -> Self {
        let evaluator = EligibilityEvaluator::new(stripe.clone(), usage, config.quota);
        let quota = LessonPlanQuota::new(EligibilityService::new(users.clone(), evaluator));

        let checkout = CheckoutManager::new(
            users.clone(),
            stripe.clone(),
            CheckoutConfig::from_billing_config(config),
        );

        let mut portal_config =
            PortalConfig::new().allowed_redirect_domains(config.allowed_redirect_domains.clone());
        if let Some(id) = &config.portal_configuration_id {
            portal_config = portal_config.configuration_id(id.clone());
        }
        let portal = PortalManager::new(users, stripe, portal_config);

        Self {
            quota: Arc::new(quota),
            checkout: Arc::new(checkout),
            portal: Arc::new(portal),
        }
    }

    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    fn users(&self) -> &SharedUserStore {
        self.quota.service().users()
    }

    /// Creates or refreshes the user record for an authenticated caller.
    async fn sync_user(&self, identity: &Identity) -> Result<User> {
        self.users().upsert_user(identity).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalRequest {
    pub return_url: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Build the billing router.
///
/// The identity provider is installed as a request extension for
/// [`CurrentIdentity`].
pub fn billing_router<P: IdentityProvider>(state: AppState, provider: P) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/billing/eligibility", get(eligibility::<P>))
        .route("/billing/usage", post(consume_generation::<P>))
        .route("/billing/checkout", post(create_checkout::<P>))
        .route("/billing/portal", post(create_portal::<P>))
        .layer(Extension(provider))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn eligibility<P: IdentityProvider>(
    State(state): State<AppState>,
    identity: CurrentIdentity<P>,
) -> Result<Json<EligibilityDecision>> {
    let identity = identity.into_inner();
    if let Some(identity) = &identity {
        state.sync_user(identity).await?;
    }

    let decision = state
        .quota
        .service()
        .check_eligibility(identity.as_ref())
        .await?;
    Ok(Json(decision))
}

async fn consume_generation<P: IdentityProvider>(
    State(state): State<AppState>,
    identity: CurrentIdentity<P>,
) -> Result<Response> {
    let identity = require_identity(identity)?;
    state.sync_user(&identity).await?;

    let response = match state.quota.consume(Some(&identity)).await? {
        consumed @ Consumption::Consumed(_) => (StatusCode::OK, Json(consumed.decision())),
        denied @ Consumption::Denied(_) => {
            (StatusCode::PAYMENT_REQUIRED, Json(denied.decision()))
        }
    };
    Ok(response.into_response())
}

async fn create_checkout<P: IdentityProvider>(
    State(state): State<AppState>,
    identity: CurrentIdentity<P>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>> {
    let identity = require_identity(identity)?;
    let user = state.sync_user(&identity).await?;

    let session = state
        .checkout
        .create_checkout_link(&user, &request.success_url, &request.cancel_url)
        .await?;
    Ok(Json(session))
}

async fn create_portal<P: IdentityProvider>(
    State(state): State<AppState>,
    identity: CurrentIdentity<P>,
    Json(request): Json<PortalRequest>,
) -> Result<Json<PortalSession>> {
    let identity = require_identity(identity)?;
    let user = state.sync_user(&identity).await?;

    let session = state
        .portal
        .create_portal_link(&user.id, &request.return_url)
        .await?;
    Ok(Json(session))
}

fn require_identity<P: IdentityProvider>(identity: CurrentIdentity<P>) -> Result<Identity> {
    identity
        .into_inner()
        .ok_or_else(|| LessonForgeError::unauthorized("Please sign in to continue"))
}
