//! LessonForge billing backend.
//!
//! Decides whether a signed-in teacher may generate another lesson plan and
//! drives the Stripe checkout and customer portal flows behind the dashboard's
//! billing page.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lessonforge::{ConfigBuilder, routes::{AppState, billing_router}};
//!
//! let config = ConfigBuilder::new().from_env().build()?;
//! lessonforge::init_tracing_with_config(&config);
//!
//! let state = AppState::new(users, usage, stripe, &config.billing);
//! let app = billing_router(state, identity_provider);
//! ```

pub mod auth;
pub mod billing;
mod config;
mod error;
pub mod routes;
pub mod utils;

pub use config::{
    AuthConfig, BillingConfig, Config, ConfigBuilder, LoggingConfig, QuotaPolicy, ServerConfig,
};
pub use error::{ErrorResponse, LessonForgeError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from `RUST_LOG` (default `info`).
///
/// Set `LESSONFORGE_LOG_JSON=true` for JSON output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with the configured level and format.
///
/// `RUST_LOG` still wins when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
