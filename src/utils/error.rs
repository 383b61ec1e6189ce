use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsectError {
    /// 模型或分类表资源缺失/损坏，或引擎尚未就绪
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// 分类表文档可解析，但缺少约定的键或字段
    #[error("Taxonomy schema error: {0}")]
    Schema(String),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl InsectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InsectError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            InsectError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            InsectError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            InsectError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            InsectError::Base64(_) => StatusCode::BAD_REQUEST,
            InsectError::Json(_) => StatusCode::BAD_REQUEST,
            InsectError::Initialization(_) => StatusCode::SERVICE_UNAVAILABLE,
            InsectError::Schema(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            InsectError::Initialization(_) => "INITIALIZATION_ERROR",
            InsectError::Schema(_) => "SCHEMA_ERROR",
            InsectError::Decode(_) => "DECODE_ERROR",
            InsectError::ShapeMismatch(_) => "SHAPE_MISMATCH",
            InsectError::Inference(_) => "INFERENCE_ERROR",
            InsectError::InvalidInput(_) => "INVALID_INPUT",
            InsectError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            InsectError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            InsectError::Config(_) => "CONFIG_ERROR",
            InsectError::Io(_) => "IO_ERROR",
            InsectError::Json(_) => "JSON_ERROR",
            InsectError::Base64(_) => "BASE64_DECODE_ERROR",
            InsectError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl InsectError {
    /// 复制一份可交给其他调用方的错误：字符串载荷的变体保持原类型，
    /// 包装外部错误源的变体转为 `Initialization`
    pub fn shared_copy(&self) -> InsectError {
        match self {
            InsectError::Initialization(m) => InsectError::Initialization(m.clone()),
            InsectError::Schema(m) => InsectError::Schema(m.clone()),
            InsectError::ShapeMismatch(m) => InsectError::ShapeMismatch(m.clone()),
            InsectError::Inference(m) => InsectError::Inference(m.clone()),
            InsectError::InvalidInput(m) => InsectError::InvalidInput(m.clone()),
            InsectError::FileTooLarge(len, max) => InsectError::FileTooLarge(*len, *max),
            InsectError::UnsupportedFormat(m) => InsectError::UnsupportedFormat(m.clone()),
            InsectError::Config(m) => InsectError::Config(m.clone()),
            InsectError::Internal(m) => InsectError::Internal(m.clone()),
            InsectError::Decode(_)
            | InsectError::Io(_)
            | InsectError::Json(_)
            | InsectError::Base64(_) => InsectError::Initialization(self.to_string()),
        }
    }
}

impl IntoResponse for InsectError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "success": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_for_core_kinds() {
        assert_eq!(
            InsectError::Initialization("not ready".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            InsectError::ShapeMismatch("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            InsectError::FileTooLarge(10, 5).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_shared_copy_keeps_kind() {
        let copy = InsectError::Schema("missing genus".into()).shared_copy();
        assert!(matches!(copy, InsectError::Schema(ref m) if m == "missing genus"));

        let io = InsectError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let copy = io.shared_copy();
        assert_eq!(copy.error_code(), "INITIALIZATION_ERROR");
        assert!(copy.to_string().contains("gone"));
    }

    #[test]
    fn test_image_error_maps_to_decode() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        let err: InsectError = err.into();
        assert_eq!(err.error_code(), "DECODE_ERROR");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
