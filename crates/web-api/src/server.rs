use crate::handlers;
use autoani_core::ExperimentEngine;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    engine: Arc<ExperimentEngine>,
}

impl ApiServer {
    #[must_use]
    pub const fn new(engine: Arc<ExperimentEngine>) -> Self {
        Self { engine }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api/tests",
                get(handlers::list_tests).post(handlers::create_test),
            )
            .route("/api/tests/:test_id", get(handlers::get_test))
            .route("/api/tests/:test_id/start", put(handlers::start_test))
            .route("/api/tests/:test_id/pause", put(handlers::pause_test))
            .route("/api/tests/:test_id/resume", put(handlers::resume_test))
            .route("/api/tests/:test_id/stop", put(handlers::stop_test))
            .route("/api/tests/:test_id/assign", get(handlers::assign_visitor))
            .route(
                "/api/tests/:test_id/impressions",
                post(handlers::record_impression),
            )
            .route(
                "/api/tests/:test_id/conversions",
                post(handlers::record_conversion),
            )
            .route("/api/tests/:test_id/results", get(handlers::get_results))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.engine.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Like [`serve`](Self::serve), but returns once `shutdown` resolves and
    /// in-flight requests have drained.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve_with_shutdown<F>(self, addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
