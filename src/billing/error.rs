//! Billing-specific error types.

use std::fmt;

use crate::error::LessonForgeError;

/// Errors raised by billing orchestration (customers, checkout, portal, Stripe).
///
/// Quota outcomes are never errors; see [`crate::billing::Eligibility`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// No Stripe customer is linked to the user.
    NoCustomer { user_id: String },
    /// The user ID is empty or malformed.
    InvalidUserId { id: String, reason: String },
    /// Invalid redirect URL provided.
    InvalidRedirectUrl { url: String, reason: String },
    /// Redirect URL domain not in allowed list.
    RedirectDomainNotAllowed { domain: String },
    /// Stripe API returned an error.
    StripeApiError {
        operation: String,
        message: String,
        code: Option<String>,
        http_status: Option<u16>,
    },
    /// The operation failed after multiple retries.
    RetryLimitExceeded { operation: String },
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCustomer { user_id } => {
                write!(f, "No Stripe customer linked to user '{}'", user_id)
            }
            Self::InvalidUserId { id, reason } => {
                write!(f, "Invalid user ID '{}': {}", id, reason)
            }
            Self::InvalidRedirectUrl { url, reason } => {
                write!(f, "Invalid redirect URL '{}': {}", url, reason)
            }
            Self::RedirectDomainNotAllowed { domain } => {
                write!(f, "Redirect domain '{}' is not allowed", domain)
            }
            Self::StripeApiError {
                operation,
                message,
                code,
                http_status,
            } => {
                write!(f, "Stripe API error during '{}': {}", operation, message)?;
                if let Some(code) = code {
                    write!(f, " (code: {})", code)?;
                }
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::RetryLimitExceeded { operation } => {
                write!(f, "Operation '{}' failed after multiple retries", operation)
            }
            Self::Internal { message } => {
                write!(f, "Internal billing error: {}", message)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for LessonForgeError {
    fn from(err: BillingError) -> Self {
        match &err {
            BillingError::NoCustomer { .. } => LessonForgeError::NotFound(err.to_string()),

            BillingError::InvalidUserId { .. }
            | BillingError::InvalidRedirectUrl { .. }
            | BillingError::RedirectDomainNotAllowed { .. } => {
                LessonForgeError::BadRequest(err.to_string())
            }

            BillingError::RetryLimitExceeded { .. } => {
                LessonForgeError::ServiceUnavailable(err.to_string())
            }
            BillingError::Internal { .. } => LessonForgeError::Internal(err.to_string()),

            BillingError::StripeApiError { http_status, .. } => match http_status {
                Some(429) => LessonForgeError::TooManyRequests(err.to_string()),
                Some(400..=499) => LessonForgeError::BadRequest(err.to_string()),
                _ => LessonForgeError::Internal(err.to_string()),
            },
        }
    }
}

impl BillingError {
    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::NoCustomer { .. }
            | Self::InvalidUserId { .. }
            | Self::InvalidRedirectUrl { .. }
            | Self::RedirectDomainNotAllowed { .. } => true,
            Self::StripeApiError { http_status, .. } => {
                matches!(http_status, Some(400..=499))
            }
            _ => false,
        }
    }

    /// Check if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::RetryLimitExceeded { .. } | Self::Internal { .. } => true,
            Self::StripeApiError { http_status, .. } => {
                matches!(http_status, Some(500..=599) | None)
            }
            _ => false,
        }
    }

    /// Rate limits (429) and Stripe server errors (5xx) are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StripeApiError { http_status, .. } => {
                matches!(http_status, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}
