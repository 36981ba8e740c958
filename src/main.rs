use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::ExposeSecret;
use tokio::signal;

use lessonforge::auth::{IdentityClaims, JwtIdentityProvider, JwtVerifier};
use lessonforge::billing::{LiveStripeClient, SeaOrmStore};
use lessonforge::routes::{AppState, billing_router};
use lessonforge::{AuthConfig, ConfigBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    lessonforge::init_tracing_with_config(&config);

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = sea_orm::Database::connect(&database_url)
        .await
        .context("failed to connect to database")?;
    let store = SeaOrmStore::new(db);
    store.ensure_schema().await?;

    let stripe_key = config
        .billing
        .stripe_secret_key
        .clone()
        .context("STRIPE_SECRET_KEY must be set")?;
    let stripe = LiveStripeClient::with_default_config(stripe_key)?;
    if stripe.is_test_mode() {
        tracing::warn!("Stripe client is running in test mode");
    }

    let provider = identity_provider(&config.auth).await?;

    let store = Arc::new(store);
    let state = AppState::new(store.clone(), store, Arc::new(stripe), &config.billing);
    let app = billing_router(state, provider);

    let addr = config.server.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server starting on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn identity_provider(auth: &AuthConfig) -> anyhow::Result<JwtIdentityProvider> {
    let mut verifier: JwtVerifier<IdentityClaims> = match (&auth.jwks_url, &auth.jwt_secret) {
        (Some(url), _) => JwtVerifier::from_jwks_url(url.clone()).await?,
        (None, Some(secret)) => JwtVerifier::from_secret(secret.expose_secret().as_bytes()),
        (None, None) => anyhow::bail!("JWKS_URL or JWT_SECRET must be set"),
    };
    if let Some(issuer) = &auth.issuer {
        verifier.set_issuer(issuer.clone());
    }
    if let Some(audience) = &auth.audience {
        verifier.set_audience(audience.clone());
    }
    Ok(JwtIdentityProvider::new(verifier))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
}
