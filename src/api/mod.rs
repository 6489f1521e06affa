use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    inference::{GenerationParams, TextGenerator},
    render::Templates,
};

pub mod handlers;
pub mod types;

use handlers::{generate_handler, index_handler};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn TextGenerator>,
    pub templates: Arc<Templates>,
    pub params: GenerationParams,
}

impl AppState {
    pub fn new(generator: Arc<dyn TextGenerator>, params: GenerationParams) -> Result<Self, minijinja::Error> {
        Ok(Self {
            generator,
            templates: Arc::new(Templates::new()?),
            params,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/generate", post(generate_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
