use crate::error::{LessonForgeError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode, decode_header};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// JSON Web Key (JWK) as published by hosted auth providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub alg: Option<String>,
}

/// JWK Set containing multiple keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Fetch JWK Set from a URL
    pub async fn fetch(url: &str) -> Result<Self> {
        let response = Client::new()
            .get(url)
            .send()
            .await
            .map_err(|e| LessonForgeError::internal(format!("Failed to fetch JWKS: {}", e)))?;

        if !response.status().is_success() {
            return Err(LessonForgeError::internal(format!(
                "JWKS endpoint returned status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LessonForgeError::internal(format!("Failed to parse JWKS: {}", e)))
    }

    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|jwk| jwk.kid.as_deref() == Some(kid))
    }
}

/// JWT verifier for session tokens issued by the identity provider.
///
/// Signature failures, expired tokens and unknown keys surface as
/// `LessonForgeError::Unauthorized`; JWKS transport failures as `Internal`.
#[derive(Clone)]
pub struct JwtVerifier<C> {
    jwks: Arc<RwLock<JwkSet>>,
    jwks_url: Option<String>,
    decoding_key: Option<DecodingKey>,
    validation: Validation,
    issuer_configured: bool,
    audience_configured: bool,
    warning_logged: Arc<OnceLock<()>>,
    _claims: std::marker::PhantomData<C>,
}

impl<C: DeserializeOwned + Clone> JwtVerifier<C> {
    /// Create a verifier that fetches RS256 keys from a JWKS endpoint
    pub async fn from_jwks_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let jwks = JwkSet::fetch(&url).await?;

        let mut verifier = Self::with_validation(Validation::new(Algorithm::RS256), None);
        verifier.jwks = Arc::new(RwLock::new(jwks));
        verifier.jwks_url = Some(url);
        Ok(verifier)
    }

    /// Create a verifier using a shared HS256 secret
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::with_validation(
            Validation::new(Algorithm::HS256),
            Some(DecodingKey::from_secret(secret)),
        )
    }

    fn with_validation(mut validation: Validation, decoding_key: Option<DecodingKey>) -> Self {
        validation.validate_exp = true;
        Self {
            jwks: Arc::new(RwLock::new(JwkSet { keys: vec![] })),
            jwks_url: None,
            decoding_key,
            validation,
            issuer_configured: false,
            audience_configured: false,
            warning_logged: Arc::new(OnceLock::new()),
            _claims: std::marker::PhantomData,
        }
    }

    pub fn set_issuer(&mut self, issuer: impl Into<String>) {
        self.validation.set_issuer(&[issuer.into()]);
        self.issuer_configured = true;
    }

    pub fn set_audience(&mut self, audience: impl Into<String>) {
        self.validation.set_audience(&[audience.into()]);
        self.audience_configured = true;
    }

    /// Refresh the JWKS after a key rotation
    pub async fn refresh_jwks(&self) -> Result<()> {
        if let Some(url) = &self.jwks_url {
            let new_jwks = JwkSet::fetch(url).await?;
            *self.jwks.write().await = new_jwks;
        }
        Ok(())
    }

    /// Verify and decode a JWT token
    pub async fn verify(&self, token: &str) -> Result<TokenData<C>> {
        if !self.issuer_configured || !self.audience_configured {
            self.warning_logged.get_or_init(|| {
                tracing::warn!(
                    target: "lessonforge::auth",
                    issuer = self.issuer_configured,
                    audience = self.audience_configured,
                    "JWT verifier is missing issuer or audience validation"
                );
            });
        }

        if let Some(key) = &self.decoding_key {
            return decode::<C>(token, key, &self.validation)
                .map_err(|e| LessonForgeError::unauthorized(format!("Invalid token: {}", e)));
        }

        let header = decode_header(token).map_err(|e| {
            LessonForgeError::unauthorized(format!("Invalid token header: {}", e))
        })?;

        let kid = header
            .kid
            .as_ref()
            .ok_or_else(|| LessonForgeError::unauthorized("Token missing 'kid' header"))?;

        let jwks = self.jwks.read().await;
        let jwk = jwks.find_by_kid(kid).ok_or_else(|| {
            LessonForgeError::unauthorized(format!("Key '{}' not found in JWKS", kid))
        })?;

        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|e| {
            LessonForgeError::internal(format!("Failed to create decoding key: {}", e))
        })?;

        decode::<C>(token, &decoding_key, &self.validation)
            .map_err(|e| LessonForgeError::unauthorized(format!("Invalid token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn claims() -> TestClaims {
        TestClaims {
            sub: "user_123".to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        }
    }

    #[tokio::test]
    async fn test_hs256_token_accepted() {
        let secret = b"lessonforge_test_secret_0123456789";
        let verifier = JwtVerifier::<TestClaims>::from_secret(secret);

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims(),
            &EncodingKey::from_secret(secret),
        )
        .unwrap();

        let data = verifier.verify(&token).await.unwrap();
        assert_eq!(data.claims.sub, "user_123");
    }

    #[tokio::test]
    async fn test_algorithm_confusion_rejected() {
        let secret = b"lessonforge_test_secret_0123456789";
        let verifier = JwtVerifier::<TestClaims>::from_secret(secret);

        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims(),
            &EncodingKey::from_secret(secret),
        )
        .unwrap();

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, LessonForgeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::<TestClaims>::from_secret(b"expected_secret");

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims(),
            &EncodingKey::from_secret(b"other_secret"),
        )
        .unwrap();

        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_none_algorithm_rejected() {
        let verifier = JwtVerifier::<TestClaims>::from_secret(b"secret");

        // {"alg":"none","typ":"JWT"}.{"sub":"user123","exp":9999999999}.
        let none_token =
            "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ1c2VyMTIzIiwiZXhwIjo5OTk5OTk5OTk5fQ.";

        assert!(verifier.verify(none_token).await.is_err());
    }
}
