use crate::error::LessonForgeError;
use axum::http::request::Parts;

/// Extracts bearer token from request headers
pub struct TokenExtractor;

impl TokenExtractor {
    /// Extract token from Authorization header
    pub fn from_header(parts: &Parts) -> Result<String, LessonForgeError> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| LessonForgeError::unauthorized("Missing authorization header"))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            LessonForgeError::unauthorized(
                "Invalid authorization header format. Expected: Bearer <token>",
            )
        })?;

        if token.is_empty() {
            return Err(LessonForgeError::unauthorized("Empty bearer token"));
        }

        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_header(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/billing/eligibility");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extracts_bearer_token() {
        let parts = parts_with_header(Some("Bearer abc.def.ghi"));
        assert_eq!(TokenExtractor::from_header(&parts).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header() {
        let parts = parts_with_header(None);
        assert!(TokenExtractor::from_header(&parts).is_err());
    }

    #[test]
    fn test_wrong_scheme_and_empty_token() {
        assert!(TokenExtractor::from_header(&parts_with_header(Some("Basic dXNlcg=="))).is_err());
        assert!(TokenExtractor::from_header(&parts_with_header(Some("Bearer "))).is_err());
    }
}
