//! Menubot - streaming menu assistant
//!
//! Each chat keeps an authoritative conversation log that the model reads and
//! a live UI stream the client renders, updated together turn by turn.

mod api;
mod conversation;
mod db;
mod display;
mod llm;
mod runtime;
mod streamable;
mod system_prompt;
mod tools;
mod ui;

use api::{create_router, AppState};
use db::Database;
use llm::LlmConfig;
use runtime::{DatabaseStore, DispatchConfig, SimulatedOrderService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "menubot=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("MENUBOT_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.menubot/menubot.db")
    });

    let port: u16 = std::env::var("MENUBOT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    let llm_config = LlmConfig::from_env();
    let llm = llm_config.build_service()?;
    let dispatch = DispatchConfig::from_env();
    tracing::info!(
        model = %llm.model_id(),
        tools = dispatch.enable_tools,
        "Model service initialized"
    );

    let orders = Arc::new(SimulatedOrderService::new(dispatch.purchase_step));
    let state = AppState::new(Arc::new(DatabaseStore::new(db)), llm, orders, dispatch);
    let dispatcher = state.dispatcher.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Menubot server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    // Let in-flight turns commit before exiting
    dispatcher.shutdown().await;
    Ok(())
}
