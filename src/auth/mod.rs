//! Identity resolution for incoming requests.

pub mod extractors;
pub mod jwt;
pub mod provider;
pub mod token;

pub use extractors::CurrentIdentity;
pub use jwt::{JwkSet, JwtVerifier};
pub use provider::{Identity, IdentityClaims, IdentityProvider, JwtIdentityProvider};
pub use token::TokenExtractor;

#[cfg(any(test, feature = "test-billing"))]
pub use provider::test::StaticIdentityProvider;
