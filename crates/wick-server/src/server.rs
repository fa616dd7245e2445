use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{create_secret, fetch_secret, fetch_secret_named, health, secret_meta};
use crate::store::Store;
use crate::{AppState, Limits};

/// Keys shorter than this are short enough to enumerate; refuse to start.
pub const MIN_KEY_LENGTH: usize = 8;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Length of generated secret keys ($WICK_KEY_LENGTH).
    pub key_length: usize,
    /// How often the background sweeper runs ($WICK_SWEEP_INTERVAL).
    pub sweep_interval: Duration,
    /// How long a spent record keeps answering Gone before the sweeper
    /// reclaims it ($WICK_SPENT_RETENTION).
    pub spent_retention: Duration,
    /// Upper bound accepted for the maxViews field ($WICK_MAX_VIEWS).
    pub max_views_limit: u32,
    /// Upper bound accepted for the expireIn field ($WICK_MAX_TTL).
    pub max_ttl: Duration,
    /// Request body cap in bytes ($WICK_MAX_PAYLOAD).
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("WICK_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("WICK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            key_length: std::env::var("WICK_KEY_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
            sweep_interval: std::env::var("WICK_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(Duration::from_secs(300)),
            spent_retention: std::env::var("WICK_SPENT_RETENTION")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(Duration::from_secs(24 * 3600)),
            max_views_limit: std::env::var("WICK_MAX_VIEWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            max_ttl: std::env::var("WICK_MAX_TTL")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(Duration::from_secs(7 * 24 * 3600)),
            max_payload_bytes: std::env::var("WICK_MAX_PAYLOAD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
        }
    }
}

impl ServerConfig {
    /// Startup bound checks. A misconfigured server refuses to start
    /// instead of silently serving guessable or immortal secrets.
    pub fn validate(&self) -> Result<()> {
        if self.key_length < MIN_KEY_LENGTH {
            anyhow::bail!("key length must be at least {MIN_KEY_LENGTH}");
        }
        if self.max_views_limit == 0 {
            anyhow::bail!("max views limit must be at least 1");
        }
        if self.max_ttl.is_zero() {
            anyhow::bail!("max ttl must be greater than zero");
        }
        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep interval must be greater than zero");
        }
        if self.max_payload_bytes == 0 {
            anyhow::bail!("max payload size must be at least 1 byte");
        }
        Ok(())
    }

    fn limits(&self) -> Limits {
        Limits {
            // validate() guarantees non-zero; MIN is an unreachable fallback.
            max_views: NonZeroU32::new(self.max_views_limit).unwrap_or(NonZeroU32::MIN),
            max_ttl: self.max_ttl,
        }
    }
}

/// Build the application router over `state`. Split out of [`run`] so the
/// integration tests drive the exact production routing table.
pub fn router(state: AppState, max_payload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/", post(create_secret))
        .route("/api/{key}", get(secret_meta))
        .route("/{key}", get(fetch_secret))
        .route("/{key}/{filename}", get(fetch_secret_named))
        .layer(DefaultBodyLimit::max(max_payload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    cfg.validate()?;

    let store = Store::new(cfg.key_length);
    let sweeper = store
        .clone()
        .spawn_sweep(cfg.sweep_interval, cfg.spent_retention);

    let state = AppState {
        store,
        limits: cfg.limits(),
    };
    let app = router(state, cfg.max_payload_bytes);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "wick server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("server stopped");
    Ok(())
}

/// Resolves on SIGINT (ctrl-c) or SIGTERM so in-flight requests finish
/// before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
