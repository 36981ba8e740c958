//! Live Stripe client implementation.
//!
//! Wraps `async-stripe` with retry on transient failures, per-call timeouts,
//! idempotency keys on creates and mapping into [`BillingError`].

use crate::error::{LessonForgeError, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::time::Duration;

use super::checkout::{CheckoutSession, CreateCheckoutSessionRequest, StripeCheckoutClient};
use super::customer::{CreateCustomerRequest, StripeClient};
use super::error::BillingError;
use super::portal::{CreatePortalSessionRequest, PortalSession, StripePortalClient};
use super::subscription::{SubscriptionLookup, SubscriptionRecord};

/// Metadata key linking Stripe objects back to the user.
const META_USER_ID: &str = "user_id";

/// Configuration for the live Stripe client.
#[derive(Debug, Clone)]
pub struct LiveStripeClientConfig {
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Per-attempt timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LiveStripeClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_seconds: 30,
        }
    }
}

impl LiveStripeClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Error returned when API key validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidApiKeyError {
    pub reason: String,
}

impl std::fmt::Display for InvalidApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid Stripe API key: {}", self.reason)
    }
}

impl std::error::Error for InvalidApiKeyError {}

/// Validate a Stripe secret or restricted key (`sk_`/`rk_`, `test_`/`live_`).
fn validate_api_key(key: &str) -> std::result::Result<(), InvalidApiKeyError> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(InvalidApiKeyError {
            reason: "API key cannot be empty".to_string(),
        });
    }

    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidApiKeyError {
            reason: format!("API key too short (minimum {} characters)", MIN_KEY_LENGTH),
        });
    }

    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(InvalidApiKeyError {
            reason: "API key must start with sk_test_, sk_live_, rk_test_, or rk_live_"
                .to_string(),
        });
    }

    Ok(())
}

fn parse_customer_id(id: &str) -> Result<stripe::CustomerId> {
    id.parse()
        .map_err(|_| LessonForgeError::bad_request(format!("Invalid customer ID: {}", id)))
}

/// Live Stripe client for production use.
///
/// # Example
///
/// ```rust,ignore
/// let client = LiveStripeClient::with_default_config(secret_key)?;
/// let checkout = CheckoutManager::new(store, client, CheckoutConfig::new("price_pro"));
/// ```
#[derive(Clone)]
pub struct LiveStripeClient {
    client: stripe::Client,
    config: LiveStripeClientConfig,
    api_key: SecretString,
}

impl LiveStripeClient {
    /// Create a new live Stripe client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key format is invalid.
    pub fn new(
        api_key: impl Into<SecretString>,
        config: LiveStripeClientConfig,
    ) -> std::result::Result<Self, InvalidApiKeyError> {
        let api_key: SecretString = api_key.into();
        validate_api_key(api_key.expose_secret())?;

        let client = stripe::Client::new(api_key.expose_secret()).with_app_info(
            env!("CARGO_PKG_NAME").to_string(),
            Some(env!("CARGO_PKG_VERSION").to_string()),
            None,
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the API key format is invalid.
    pub fn with_default_config(
        api_key: impl Into<SecretString>,
    ) -> std::result::Result<Self, InvalidApiKeyError> {
        Self::new(api_key, LiveStripeClientConfig::default())
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    /// A client that sends a fresh idempotency key, reused across retries.
    fn idempotent_client(&self, operation: &str) -> stripe::Client {
        let key = format!("{}_{}", operation, uuid::Uuid::new_v4());
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key))
    }
}

impl std::fmt::Debug for LiveStripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStripeClient")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

/// Run a Stripe call with a per-attempt timeout, retrying 429, 5xx and timeouts.
async fn with_retry<T, F, Fut>(
    config: &LiveStripeClientConfig,
    operation: &str,
    operation_fn: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, stripe::StripeError>>,
{
    let timeout_duration = Duration::from_secs(config.timeout_seconds);
    let mut attempts = 0;

    loop {
        match tokio::time::timeout(timeout_duration, operation_fn()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                if !is_retryable_error(&e) {
                    return Err(map_stripe_error(e, operation).into());
                }
                if attempts >= config.max_retries {
                    tracing::error!(
                        target: "lessonforge::billing::stripe",
                        operation = operation,
                        attempts = attempts + 1,
                        error = %e,
                        "Stripe API call failed after retries"
                    );
                    return Err(BillingError::RetryLimitExceeded {
                        operation: operation.to_string(),
                    }
                    .into());
                }

                let delay =
                    calculate_backoff_delay(attempts, config.base_delay_ms, config.max_delay_ms);
                tracing::warn!(
                    target: "lessonforge::billing::stripe",
                    operation = operation,
                    attempt = attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying Stripe API call after transient error"
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
            Err(_elapsed) => {
                if attempts >= config.max_retries {
                    return Err(BillingError::RetryLimitExceeded {
                        operation: operation.to_string(),
                    }
                    .into());
                }

                tracing::warn!(
                    target: "lessonforge::billing::stripe",
                    operation = operation,
                    attempt = attempts + 1,
                    timeout_seconds = config.timeout_seconds,
                    "Stripe API request timed out, retrying"
                );
                tokio::time::sleep(calculate_backoff_delay(
                    attempts,
                    config.base_delay_ms,
                    config.max_delay_ms,
                ))
                .await;
                attempts += 1;
            }
        }
    }
}

fn is_retryable_error(error: &stripe::StripeError) -> bool {
    match error {
        stripe::StripeError::Stripe(request_error) => {
            let status = request_error.http_status;
            status == 429 || (500..600).contains(&status)
        }
        stripe::StripeError::Timeout => true,
        _ => false,
    }
}

/// Exponential backoff (`base * 2^attempt`, capped) plus up to 25% jitter.
fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(max_ms);

    let jitter = if delay_ms > 0 {
        fastrand::u64(0..=delay_ms / 4)
    } else {
        0
    };
    Duration::from_millis(delay_ms.saturating_add(jitter))
}

fn map_stripe_error(error: stripe::StripeError, operation: &str) -> BillingError {
    match error {
        stripe::StripeError::Stripe(request_error) => BillingError::StripeApiError {
            operation: operation.to_string(),
            message: request_error
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
            code: request_error.code.as_ref().map(|c| format!("{c:?}")),
            http_status: Some(request_error.http_status),
        },
        stripe::StripeError::Timeout => BillingError::RetryLimitExceeded {
            operation: operation.to_string(),
        },
        stripe::StripeError::ClientError(msg) => BillingError::Internal {
            message: format!("HTTP client error: {msg}"),
        },
        other => BillingError::Internal {
            message: format!("Stripe request failed during '{operation}': {other}"),
        },
    }
}

fn user_metadata(user_id: &str) -> HashMap<String, String> {
    HashMap::from([(META_USER_ID.to_string(), user_id.to_string())])
}

#[async_trait]
impl StripeClient for LiveStripeClient {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String> {
        let client = self.idempotent_client("create_customer");

        let mut params = stripe::CreateCustomer::new();
        params.email = Some(&request.email);
        params.name = request.name.as_deref();
        params.metadata = Some(user_metadata(&request.metadata.user_id));

        let customer = with_retry(&self.config, "create_customer", || {
            let client = client.clone();
            let params = params.clone();
            async move { stripe::Customer::create(&client, params).await }
        })
        .await?;

        Ok(customer.id.to_string())
    }
}

#[async_trait]
impl StripeCheckoutClient for LiveStripeClient {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        let client = self.idempotent_client("create_checkout_session");
        let customer_id = parse_customer_id(&request.customer_id)?;

        let mut params = stripe::CreateCheckoutSession::new();
        params.customer = Some(customer_id);
        params.mode = Some(stripe::CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.allow_promotion_codes = Some(request.allow_promotion_codes);
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(request.quantity),
            ..Default::default()
        }]);
        params.metadata = Some(user_metadata(&request.metadata.user_id));
        params.subscription_data = Some(stripe::CreateCheckoutSessionSubscriptionData {
            metadata: Some(user_metadata(&request.metadata.user_id)),
            ..Default::default()
        });

        let session = with_retry(&self.config, "create_checkout_session", || {
            let client = client.clone();
            let params = params.clone();
            async move { stripe::CheckoutSession::create(&client, params).await }
        })
        .await?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url.ok_or_else(|| BillingError::Internal {
                message: "Checkout session URL missing".to_string(),
            })?,
        })
    }
}

#[async_trait]
impl StripePortalClient for LiveStripeClient {
    async fn create_portal_session(
        &self,
        request: CreatePortalSessionRequest,
    ) -> Result<PortalSession> {
        let customer_id = parse_customer_id(&request.customer_id)?;

        let mut params = stripe::CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&request.return_url);
        params.configuration = request.configuration_id.as_deref();

        let session = with_retry(&self.config, "create_portal_session", || {
            let client = self.client.clone();
            let params = params.clone();
            async move { stripe::BillingPortalSession::create(&client, params).await }
        })
        .await?;

        Ok(PortalSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }
}

#[async_trait]
impl SubscriptionLookup for LiveStripeClient {
    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>> {
        let customer_id = parse_customer_id(customer_id)?;

        let list = with_retry(&self.config, "list_subscriptions", || {
            let client = self.client.clone();
            let customer_id = customer_id.clone();
            async move {
                let mut params = stripe::ListSubscriptions::new();
                params.customer = Some(customer_id);
                params.status = Some(stripe::SubscriptionStatusFilter::All);
                stripe::Subscription::list(&client, &params).await
            }
        })
        .await?;

        Ok(list
            .data
            .into_iter()
            .map(|sub| SubscriptionRecord {
                id: sub.id.to_string(),
                status: sub.status.as_str().to_string(),
                current_period_start: sub.current_period_start,
                current_period_end: sub.current_period_end,
                created: sub.created,
            })
            .collect())
    }
}
