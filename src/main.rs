use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use codegen_api::{
    api::{self, AppState},
    config::AppConfig,
    inference::CausalLm,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging + config
    // -----------------------------
    let config = AppConfig::from_env()?;
    telemetry::init();

    info!(
        model = %config.model.model_id,
        max_length = config.generation.max_length,
        "starting code generation server"
    );

    // -----------------------------
    // Model (loaded once, shared read-only)
    // -----------------------------
    let model = CausalLm::load(&config.model)
        .await
        .with_context(|| format!("loading model '{}'", config.model.model_id))?;

    let state = AppState::new(Arc::new(model), config.generation)?;
    let app = api::router(state);

    // -----------------------------
    // Serve
    // -----------------------------
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!(addr = %listener.local_addr()?, "HTTP listening");
    info!("POST /generate with {{\"prompt\": \"...\"}}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
