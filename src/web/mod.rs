pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::inference::InferenceEngine;
use crate::utils::error::InsectError;
use crate::{Config, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<InferenceEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<InferenceEngine>) -> Self {
        Self { config, engine }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 模型加载是阻塞操作，放到阻塞线程池执行
    let engine = Arc::new(InferenceEngine::new(config.onnx_config.clone()));
    {
        let engine = Arc::clone(&engine);
        let config = config.clone();
        tokio::task::spawn_blocking(move || engine.initialize_from_config(&config))
            .await
            .map_err(|e| InsectError::Internal(format!("Initialization task failed: {}", e)))??;
    }

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        InsectError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    let app = create_app(AppState::new(config, engine));

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /classify        - JSON base64 upload");
    tracing::info!("  POST /classify/upload - Multipart file upload");
    tracing::info!("  GET  /health          - Engine state");
    tracing::info!("  GET  /api/info        - Service information");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| InsectError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| InsectError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        .route("/classify", post(handlers::classify_json_handler))
        .route("/classify/upload", post(handlers::classify_upload_handler))
        .route("/health", get(handlers::health_handler))
        .route("/api/info", get(handlers::info_handler))
        .layer(from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(server_config.max_request_size))
        .layer(RequestBodyLimitLayer::new(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
