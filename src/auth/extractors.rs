use crate::auth::provider::{Identity, IdentityProvider};
use crate::auth::token::TokenExtractor;
use crate::error::LessonForgeError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::future::Future;
use std::marker::PhantomData;

/// Axum extractor for the caller's identity, if any.
///
/// A missing or malformed `Authorization` header and tokens the provider
/// does not recognise all yield `CurrentIdentity(None)`; the request is not
/// rejected. A provider failure is returned as an error response.
///
/// The provider `P` must be installed as a request extension
/// (`Extension(provider)` layer).
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     identity: CurrentIdentity<JwtIdentityProvider>,
/// ) -> String {
///     identity
///         .into_inner()
///         .map(|i| i.id)
///         .unwrap_or_else(|| "anonymous".into())
/// }
/// ```
pub struct CurrentIdentity<P: IdentityProvider>(pub Option<Identity>, PhantomData<P>);

impl<P: IdentityProvider> CurrentIdentity<P> {
    pub fn into_inner(self) -> Option<Identity> {
        self.0
    }
}

impl<P, S> FromRequestParts<S> for CurrentIdentity<P>
where
    P: IdentityProvider,
    S: Send + Sync,
{
    type Rejection = LessonForgeError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        Box::pin(async move {
            let provider = parts
                .extensions
                .get::<P>()
                .ok_or_else(|| {
                    LessonForgeError::internal("Identity provider not found in request extensions")
                })?
                .clone();

            let token = match TokenExtractor::from_header(parts) {
                Ok(t) => t,
                Err(_) => return Ok(CurrentIdentity(None, PhantomData)),
            };

            let identity = provider.resolve(&token).await?;
            Ok(CurrentIdentity(identity, PhantomData))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::test::StaticIdentityProvider;
    use axum::http::Request;

    fn identity() -> Identity {
        Identity {
            id: "user_1".to_string(),
            email: "teacher@school.edu".to_string(),
            name: None,
        }
    }

    async fn extract(
        provider: Option<StaticIdentityProvider>,
        auth: Option<&str>,
    ) -> Result<Option<Identity>, LessonForgeError> {
        let mut builder = Request::builder().uri("/billing/eligibility");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let mut parts = builder.body(()).unwrap().into_parts().0;
        if let Some(provider) = provider {
            parts.extensions.insert(provider);
        }
        CurrentIdentity::<StaticIdentityProvider>::from_request_parts(&mut parts, &())
            .await
            .map(CurrentIdentity::into_inner)
    }

    #[tokio::test]
    async fn test_resolves_known_token() {
        let provider = StaticIdentityProvider::new().with_identity("good", identity());
        let resolved = extract(Some(provider), Some("Bearer good")).await.unwrap();
        assert_eq!(resolved, Some(identity()));
    }

    #[tokio::test]
    async fn test_anonymous_requests_are_not_rejected() {
        let provider = StaticIdentityProvider::new().with_identity("good", identity());
        assert_eq!(extract(Some(provider.clone()), None).await.unwrap(), None);
        assert_eq!(
            extract(Some(provider), Some("Bearer unknown")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_missing_provider_is_server_error() {
        let err = extract(None, Some("Bearer good")).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::Internal(_)));
    }
}
