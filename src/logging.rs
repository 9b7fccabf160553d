//! Tracing initialization helper for embedding applications and this
//! crate's own test harness.
//!
//! A thin wrapper that picks JSON vs. human-readable output based on
//! configuration rather than hard-coding a subscriber, so a host
//! application can opt into whichever format its own log pipeline expects.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the default subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, suitable for local development.
    #[default]
    Pretty,
    /// Structured JSON, suitable for log aggregation.
    Json,
}

/// Installs a global `tracing` subscriber. Safe to call multiple times in a
/// test binary; subsequent calls after the first are no-ops.
///
/// Respects `RUST_LOG` if set, otherwise defaults to `info`.
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let _ = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    };
}
