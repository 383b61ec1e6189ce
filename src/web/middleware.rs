use crate::web::extractors::RequestId;
use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// 请求日志中间件，同时确定本次请求的 ID 并回写到响应头
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = RequestId::from_headers(req.headers());
    req.extensions_mut().insert(request_id.clone());

    let start_time = Instant::now();
    tracing::debug!("Request started: {} {} [{}]", method, uri, request_id.0);

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(RequestId::HEADER, value);
    }

    tracing::info!(
        "Request completed: {} {} [{}] - {} - {}ms",
        method,
        uri,
        request_id.0,
        response.status(),
        start_time.elapsed().as_millis()
    );

    response
}
