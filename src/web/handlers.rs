use crate::{
    inference::{EngineState, InferenceEngine, PredictionResult},
    image::ImageLoader,
    utils::error::InsectError,
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct ClassifyJsonRequest {
    /// Base64编码的图像数据，可带 data URL 前缀
    pub image: String,
}

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// 分类在阻塞线程池执行，避免占用异步工作线程
async fn run_classification(
    engine: Arc<InferenceEngine>,
    image_bytes: Vec<u8>,
) -> Result<PredictionResult> {
    tokio::task::spawn_blocking(move || engine.classify(&image_bytes))
        .await
        .map_err(|e| InsectError::Internal(format!("Classification task failed: {}", e)))?
}

/// JSON base64上传处理器
pub async fn classify_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ClassifyJsonRequest>,
) -> Result<Json<ApiResponse<PredictionResult>>> {
    let start_time = Instant::now();
    tracing::info!("Processing JSON classify request: request_id={}", request_id);

    let image_bytes = ImageLoader::decode_base64(&request.image)?;
    let result = run_classification(Arc::clone(&state.engine), image_bytes).await?;

    tracing::info!(
        "JSON classify completed: request_id={}, levels={}, time={:.3}s",
        request_id,
        result.len(),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(result, request_id)))
}

/// Multipart文件上传处理器
pub async fn classify_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<PredictionResult>>> {
    let start_time = Instant::now();
    tracing::info!("Processing multipart classify request: request_id={}", request_id);

    let mut image_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        InsectError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name != "file" {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        // 验证内容类型
        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") && content_type != "application/octet-stream" {
                return Err(InsectError::UnsupportedFormat(content_type.to_string()));
            }
        }

        let data = field.bytes().await.map_err(|e| {
            InsectError::InvalidInput(format!("Failed to read file data: {}", e))
        })?;

        if data.is_empty() {
            return Err(InsectError::InvalidInput("Empty file".to_string()));
        }

        tracing::debug!("Received file: {} bytes", data.len());
        image_data = Some(data.to_vec());
    }

    let image_data =
        image_data.ok_or_else(|| InsectError::InvalidInput("No image file provided".to_string()))?;

    let result = run_classification(Arc::clone(&state.engine), image_data).await?;

    tracing::info!(
        "Upload classify completed: request_id={}, levels={}, time={:.3}s",
        request_id,
        result.len(),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(result, request_id)))
}

/// 健康检查：引擎未就绪时返回 503
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let engine_state = state.engine.state();
    let (status, label) = if engine_state == EngineState::Ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    let body = serde_json::json!({
        "status": label,
        "state": engine_state,
        "last_error": state.engine.last_error(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status, Json(body))
}

/// 服务信息
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Hierarchical insect classification over ONNX Runtime",
        "endpoints": {
            "classify": "POST /classify",
            "upload": "POST /classify/upload",
            "health": "GET /health",
            "info": "GET /api/info",
        },
        "max_request_size": state.config.server_config.max_request_size,
        "engine": state.engine.stats(),
    }))
}
