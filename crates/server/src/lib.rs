//! HTTP surface for generating, autosaving and submitting drill attempts.

mod error;
pub mod http;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

pub use error::{ApiError, ErrorResponse, ServerError};
pub use http::create_router;
pub use state::AppState;

/// The drill HTTP server
pub struct DrillServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl DrillServer {
    #[must_use]
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server, binding to the configured address
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address is unavailable and
    /// `ServerError::Internal` if serving fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("drill server listening on {}", addr);

        self.start_live_eviction();

        let router = create_router(self.state);
        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Periodically drop live attempts that have been idle past their TTL.
    fn start_live_eviction(&self) {
        let state = Arc::clone(&self.state);
        let period = self.config.eviction_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = state.services.attempts().evict_expired().await {
                    tracing::warn!(error = %e, "live session eviction failed");
                }
            }
        });
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How often idle live attempts are swept
    pub eviction_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            eviction_period: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the socket address string (e.g., "127.0.0.1:7878")
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
