use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}

/// Closed set of error shapes the gateway's HTTP surface can return.
/// Each variant carries the short reason that is surfaced verbatim in
/// the `detail` field of the JSON body.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized { reason: &'static str },
    TooManyRequests { reason: String },
    BadGateway { reason: &'static str },
    Internal { message: String },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal { message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, error_code) = match self {
            ApiError::Unauthorized { reason } => (StatusCode::UNAUTHORIZED, reason.to_string(), "unauthorized"),
            ApiError::TooManyRequests { reason } => (StatusCode::TOO_MANY_REQUESTS, reason, "too_many_requests"),
            ApiError::BadGateway { reason } => (StatusCode::BAD_GATEWAY, reason.to_string(), "bad_gateway"),
            ApiError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message, "internal_error"),
        };
        let mut resp = (status, Json(ErrorBody { detail })).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthorized_shape() {
        let resp = ApiError::Unauthorized { reason: "Missing or invalid API key" }.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "unauthorized");
        let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.detail, "Missing or invalid API key");
    }

    #[tokio::test]
    async fn too_many_requests_shape() {
        let resp = ApiError::TooManyRequests { reason: "Confirmed abuse: rate limit exceeded".into() }.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn bad_gateway_shape() {
        let resp = ApiError::BadGateway { reason: "Upstream error" }.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn internal_shape() {
        let resp = ApiError::internal("boom").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
    }
}
