use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Terminal failures of a webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MethodNotAllowed,
    Forbidden,
    BadRequest,
    ServerError,
    DeployFailed,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest => "BAD_REQUEST",
            Self::ServerError => "SERVER_ERROR",
            Self::DeployFailed => "DEPLOY_FAILED",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::ServerError | Self::DeployFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "Method not allowed",
            Self::Forbidden => "Forbidden - Invalid signature",
            Self::BadRequest => "Bad request",
            Self::ServerError => "Server error",
            Self::DeployFailed => "Deploy failed",
        }
    }
}

/// Error surfaced to the webhook caller as a status code and a short
/// plain-text reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookError {
    code: ErrorCode,
    message: String,
}

impl WebhookError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for WebhookError {}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.code.status(), self.message).into_response()
    }
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    use super::{ErrorCode, WebhookError};

    async fn body_text(error: WebhookError) -> (StatusCode, String) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        (status, String::from_utf8(body.to_vec()).expect("error body should be utf-8"))
    }

    #[tokio::test]
    async fn default_messages_match_wire_contract() {
        assert_eq!(
            body_text(WebhookError::from_code(ErrorCode::MethodNotAllowed)).await,
            (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
        );
        assert_eq!(
            body_text(WebhookError::from_code(ErrorCode::Forbidden)).await,
            (StatusCode::FORBIDDEN, "Forbidden - Invalid signature".to_string())
        );
        assert_eq!(
            body_text(WebhookError::from_code(ErrorCode::DeployFailed)).await,
            (StatusCode::INTERNAL_SERVER_ERROR, "Deploy failed".to_string())
        );
    }

    #[tokio::test]
    async fn custom_message_is_preserved() {
        let (status, body) =
            body_text(WebhookError::new(ErrorCode::ServerError, "Not a git repository")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Not a git repository");
    }

    #[test]
    fn codes_have_stable_names() {
        assert_eq!(ErrorCode::BadRequest.as_str(), "BAD_REQUEST");
        assert_eq!(ErrorCode::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebhookError::from_code(ErrorCode::DeployFailed).to_string(),
            "DEPLOY_FAILED: Deploy failed"
        );
    }
}
