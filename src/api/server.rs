//! HTTP server lifecycle.
//!
//! bind → spawn the axum task plus a maintenance task → return a handle
//! with a shutdown channel. `serve_until_ctrl_c` wires that to the
//! process signal for the binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::router::build_router;
use crate::api::types::ApiContext;
use crate::config::Config;
use crate::core_state::CoreState;

/// Session eviction and audit flush interval.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Handle to a running server.
pub struct ApiServer {
    pub addr: SocketAddr,
    core: Arc<CoreState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    maintenance_task: JoinHandle<()>,
}

impl ApiServer {
    /// Signal graceful shutdown, wait for in-flight requests, flush the audit log.
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
        self.maintenance_task.abort();

        let served = match self.server_task.await {
            Ok(result) => result.map_err(ServerError::from),
            Err(e) => {
                tracing::error!("API server task failed: {e}");
                Ok(())
            }
        };

        match self.core.audit().flush() {
            Ok(n) if n > 0 => tracing::info!(flushed = n, "Audit log flushed on shutdown"),
            Ok(_) => {}
            Err(e) => tracing::warn!("Final audit flush failed: {e}"),
        }
        served
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);
    // Config validated the origin as printable ASCII.
    let Some(origin) = config.cors_allow_origin.as_deref() else {
        return base;
    };
    match HeaderValue::from_str(origin) {
        Ok(origin) => base.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            tracing::error!(origin, "CORS origin not usable as a header: {e}");
            base
        }
    }
}

fn app(ctx: ApiContext) -> Router {
    let cors = cors_layer(&ctx.core.config);
    build_router(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn spawn_maintenance(ctx: ApiContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = ctx.core.maintenance() {
                tracing::warn!("Maintenance pass failed: {e}");
            }
            if let Ok(mut limiter) = ctx.rate_limiter.lock() {
                limiter.prune();
            }
        }
    })
}

/// Bind `addr` and start serving in the background.
pub async fn start(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr()?;

    let ctx = ApiContext::new(core.clone());
    let router = app(ctx.clone());
    let maintenance_task = spawn_maintenance(ctx);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };
        tracing::info!(%addr, "API server started");
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await;
        tracing::info!("API server stopped");
        result
    });

    Ok(ApiServer {
        addr,
        core,
        shutdown_tx: Some(shutdown_tx),
        server_task,
        maintenance_task,
    })
}

/// Serve on the configured address until ctrl-c.
pub async fn serve_until_ctrl_c(core: Arc<CoreState>) -> Result<(), ServerError> {
    let addr = core.config.bind_addr;
    let server = start(core, addr).await?;
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for ctrl-c: {e}");
    }
    server.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::test_support::{test_config, test_core};
    use crate::pipeline::llm::MockLlmClient;

    fn localhost() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let core = test_core(Arc::new(MockLlmClient::new()));
        let server = start(core, localhost()).await.expect("server should start");
        assert!(server.addr.port() > 0);

        let base = format!("http://{}", server.addr);
        let health = reqwest::get(format!("{base}/api/health")).await.unwrap();
        assert_eq!(health.status().as_u16(), 200);

        let me = reqwest::get(format!("{base}/api/auth/me")).await.unwrap();
        assert_eq!(me.status().as_u16(), 401);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_reported() {
        let core = test_core(Arc::new(MockLlmClient::new()));
        let first = start(core.clone(), localhost()).await.unwrap();
        let err = start(core, first.addr).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown().await.unwrap();
    }

    #[test]
    fn cors_origin_from_config() {
        let mut config = test_config();
        config.cors_allow_origin = Some("https://portal.example.org".into());
        // Building must not panic with credentials plus an explicit origin
        let _ = cors_layer(&config);
    }
}
