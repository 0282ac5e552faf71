// Library exports for testing and external use

pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use services::compiler::LatexCompiler;
use utils::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub compiler: Arc<LatexCompiler>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        Self {
            compiler: Arc::new(LatexCompiler::new(config.clone())),
            config,
        }
    }
}

/// Routes without middleware; `main` adds tracing, timeouts and CORS.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/compile", post(handlers::compile::compile_document))
        .with_state(state)
}
