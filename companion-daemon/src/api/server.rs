//! HTTP server setup and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handlers::{self, ApiState};

/// Prefixes under which the gateway routes are also mounted.
pub const GATEWAY_PREFIXES: [&str; 2] = ["/newapi", "/open-webui"];

/// Handle to a running HTTP server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    join_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Build the router.
///
/// Gateway-facing routes are served at the root and again under each
/// prefix existing gateway and Open WebUI callers were configured with.
pub fn router(state: ApiState) -> Router {
    let gateway = Router::new()
        .route("/ensure_token", post(handlers::ensure_token))
        .route("/notification/{source}", post(handlers::notification));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/feishu/events", post(handlers::feishu_events))
        .merge(gateway.clone());
    for prefix in GATEWAY_PREFIXES {
        app = app.nest(prefix, gateway.clone());
    }

    app.layer(middleware::from_fn(log_request)).with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

/// Bind `addr` and serve the API in a background task.
///
/// # Returns
///
/// A handle to the running server that can be used to stop it.
pub async fn start_server(addr: SocketAddr, state: ApiState) -> Result<ServerHandle> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read bound address")?;

    info!(%local_addr, "starting HTTP server");

    let app = router(state);
    let (tx, rx) = oneshot::channel::<()>();

    let server_task: JoinHandle<()> = tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
            debug!("server shutdown signal received");
        };

        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        {
            warn!(error = %e, "HTTP server exited with error");
        }

        info!("HTTP server stopped");
    });

    Ok(ServerHandle {
        local_addr,
        shutdown: Arc::new(Mutex::new(Some(tx))),
        join_handle: Arc::new(Mutex::new(Some(server_task))),
    })
}

impl ServerHandle {
    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the server and wait for in-flight requests to finish.
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.lock().await.take() {
            handle.await.context("Server task panicked")?;
        }

        Ok(())
    }
}
