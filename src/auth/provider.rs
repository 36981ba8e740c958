use crate::auth::jwt::JwtVerifier;
use crate::error::{LessonForgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The authenticated caller as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Resolves a session token to an [`Identity`].
///
/// Implementations return `Ok(None)` for tokens that are invalid, expired or
/// unknown, and reserve `Err` for provider outages.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct SessionTable { sessions: Arc<HashMap<String, Identity>> }
///
/// #[async_trait]
/// impl IdentityProvider for SessionTable {
///     async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
///         Ok(self.sessions.get(token).cloned())
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityProvider: Send + Sync + Clone + 'static {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>>;
}

/// Claims carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
}

impl From<IdentityClaims> for Identity {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
        }
    }
}

/// Identity provider backed by signed session JWTs.
#[derive(Clone)]
pub struct JwtIdentityProvider {
    verifier: JwtVerifier<IdentityClaims>,
}

impl JwtIdentityProvider {
    pub fn new(verifier: JwtVerifier<IdentityClaims>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        match self.verifier.verify(token).await {
            Ok(data) => Ok(Some(data.claims.into())),
            Err(LessonForgeError::Unauthorized(reason)) => {
                tracing::debug!(target: "lessonforge::auth", %reason, "Session token rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// Token → identity table for tests.
    #[derive(Clone, Default)]
    pub struct StaticIdentityProvider {
        identities: Arc<RwLock<HashMap<String, Identity>>>,
    }

    impl StaticIdentityProvider {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register `token` as a session for `identity`.
        pub fn with_identity(self, token: impl Into<String>, identity: Identity) -> Self {
            self.identities
                .write()
                .unwrap()
                .insert(token.into(), identity);
            self
        }
    }

    #[async_trait]
    impl IdentityProvider for StaticIdentityProvider {
        async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
            Ok(self.identities.read().unwrap().get(token).cloned())
        }
    }
}
