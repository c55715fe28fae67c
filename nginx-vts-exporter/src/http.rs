//! HTTP server for the Prometheus metrics endpoint.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::SharedCollector;
use crate::exposition::{CONTENT_TYPE, render};
use crate::fetcher::CollectionSource;

/// Application state shared across handlers.
struct AppState<S> {
    collector: SharedCollector<S>,
    const_labels: Arc<BTreeMap<String, String>>,
    landing_page: Arc<str>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            collector: self.collector.clone(),
            const_labels: self.const_labels.clone(),
            landing_page: self.landing_page.clone(),
        }
    }
}

fn landing_page(metrics_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>Nginx VTS Exporter</title></head>\n\
         <body>\n\
         <h1>Nginx VTS Exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        metrics_path
    )
}

/// Create the HTTP router.
fn create_router<S: CollectionSource>(
    collector: SharedCollector<S>,
    metrics_path: &str,
    const_labels: BTreeMap<String, String>,
) -> Router {
    let state = AppState {
        collector,
        const_labels: Arc::new(const_labels),
        landing_page: landing_page(metrics_path).into(),
    };

    Router::new()
        .route("/", get(index_handler::<S>))
        .route(metrics_path, get(metrics_handler::<S>))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
///
/// Each request runs one collection. A failed fetch still answers 200 with
/// the scrape counters so the exporter stays distinguishable from nginx.
async fn metrics_handler<S: CollectionSource>(State(state): State<AppState<S>>) -> Response {
    let samples = state.collector.collect().await;
    let body = render(&samples, &state.const_labels);

    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the landing page.
async fn index_handler<S: CollectionSource>(State(state): State<AppState<S>>) -> Response {
    Html(state.landing_page.to_string()).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server configuration.
pub struct HttpServer<S> {
    collector: SharedCollector<S>,
    listen_addr: SocketAddr,
    metrics_path: String,
    const_labels: BTreeMap<String, String>,
}

impl<S: CollectionSource> HttpServer<S> {
    /// Create a new HTTP server.
    pub fn new(collector: SharedCollector<S>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            collector,
            listen_addr,
            metrics_path,
            const_labels: BTreeMap::new(),
        }
    }

    /// Add constant labels to every exported sample.
    pub fn with_const_labels(mut self, const_labels: BTreeMap<String, String>) -> Self {
        self.const_labels = const_labels;
        self
    }

    /// Bind the listen address and serve until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        let router = create_router(self.collector, &self.metrics_path, self.const_labels);

        info!(
            addr = %addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
