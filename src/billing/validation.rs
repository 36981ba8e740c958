//! Input validation for billing operations.
//!
//! User IDs arrive from the identity provider and end up in Stripe metadata
//! and database keys; redirect URLs arrive from the browser and are handed to
//! Stripe as post-checkout destinations. Both are checked here.

use super::error::BillingError;
use crate::error::Result;

/// Maximum length for user IDs.
const MAX_USER_ID_LENGTH: usize = 256;

/// Validate a user ID.
///
/// User IDs must:
/// - Not be empty
/// - Not exceed 256 characters
/// - Contain only ASCII alphanumerics and `_ - | . : @`, which covers
///   provider-prefixed subjects such as `auth0|abc123` and email subjects
///
/// # Errors
///
/// Returns `BillingError::InvalidUserId` if validation fails.
pub fn validate_user_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(BillingError::InvalidUserId {
            id: id.to_string(),
            reason: "user_id cannot be empty".to_string(),
        }
        .into());
    }

    if id.len() > MAX_USER_ID_LENGTH {
        return Err(BillingError::InvalidUserId {
            id: sanitize_for_error(id),
            reason: format!("user_id exceeds maximum length of {}", MAX_USER_ID_LENGTH),
        }
        .into());
    }

    if !id.chars().all(is_user_id_char) {
        return Err(BillingError::InvalidUserId {
            id: sanitize_for_error(id),
            reason: "user_id contains invalid characters (only alphanumeric and _ - | . : @ allowed)"
                .to_string(),
        }
        .into());
    }

    Ok(())
}

fn is_user_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '|' | '.' | ':' | '@')
}

/// Validate a redirect URL against the allowed domain list.
///
/// The URL must parse, use HTTPS and carry a host. When `allowed_domains`
/// is non-empty the host must equal one of them or be a subdomain of one.
///
/// # Errors
///
/// Returns `BillingError::InvalidRedirectUrl` or
/// `BillingError::RedirectDomainNotAllowed`.
pub fn validate_redirect_url(url: &str, allowed_domains: &[String]) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| BillingError::InvalidRedirectUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.scheme() != "https" {
        return Err(BillingError::InvalidRedirectUrl {
            url: url.to_string(),
            reason: "URL must use HTTPS".to_string(),
        }
        .into());
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| BillingError::InvalidRedirectUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        })?
        .to_ascii_lowercase();

    if allowed_domains.is_empty() {
        return Ok(());
    }

    let allowed = allowed_domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    });

    if !allowed {
        return Err(BillingError::RedirectDomainNotAllowed { domain: host }.into());
    }

    Ok(())
}

/// Sanitize a string for error messages to prevent log injection.
fn sanitize_for_error(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .take(50)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '?'
            }
        })
        .collect();

    if s.chars().count() > 50 {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LessonForgeError;

    #[test]
    fn test_validate_user_id_valid() {
        assert!(validate_user_id("user_2abc").is_ok());
        assert!(validate_user_id("0b6c1f4e-8a1d-4c1e-9a55-2f1f0c9d7e11").is_ok());
        assert!(validate_user_id("a").is_ok());
    }

    #[test]
    fn test_validate_user_id_accepts_provider_subjects() {
        assert!(validate_user_id("auth0|abc123").is_ok());
        assert!(validate_user_id("google-oauth2|10483920").is_ok());
        assert!(validate_user_id("teacher@school.edu").is_ok());
        assert!(validate_user_id("urn:user:42").is_ok());
    }

    #[test]
    fn test_validate_user_id_invalid() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id(&"a".repeat(300)).is_err());
        assert!(validate_user_id("user<script>").is_err());
        assert!(validate_user_id("user 123").is_err());
        assert!(validate_user_id("user;DROP TABLE").is_err());
    }

    #[test]
    fn test_sanitize_for_error() {
        assert_eq!(sanitize_for_error("user<1>"), "user?1?");
        assert!(sanitize_for_error(&"é".repeat(60)).ends_with("..."));
    }

    fn domains() -> Vec<String> {
        vec!["lessonforge.app".to_string()]
    }

    #[test]
    fn test_redirect_url_allowed() {
        assert!(validate_redirect_url("https://lessonforge.app/billing", &domains()).is_ok());
        assert!(validate_redirect_url("https://www.lessonforge.app/done", &domains()).is_ok());
        assert!(validate_redirect_url("https://anything.example.com/", &[]).is_ok());
    }

    #[test]
    fn test_redirect_url_requires_https() {
        let err = validate_redirect_url("http://lessonforge.app/billing", &domains()).unwrap_err();
        assert!(matches!(err, LessonForgeError::BadRequest(msg) if msg.contains("HTTPS")));
    }

    #[test]
    fn test_redirect_url_rejects_other_domains() {
        assert!(validate_redirect_url("https://evil.com/", &domains()).is_err());
        assert!(validate_redirect_url("https://evillessonforge.app/", &domains()).is_err());
        assert!(validate_redirect_url("not a url", &domains()).is_err());
    }
}
