//! HTTP surface: axum router over a shared [`ConversionService`].

mod error;
mod routes;

pub use error::{ApiError, ReplyStyle};

use crate::lifecycle::ConversionService;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for multipart boundaries and the text fields on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the application router.
pub fn router(service: Arc<ConversionService>) -> Router {
    let body_limit = service
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/", get(routes::index))
        .route("/convert", post(routes::convert))
        .route("/formats", get(routes::formats))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(
    listener: TcpListener,
    service: Arc<ConversionService>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
