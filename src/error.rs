use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// The single error taxonomy the engine returns across adapters, caches,
/// the scheduler and the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {message}")]
    Transient {
        message: String,
        /// Carried through from an upstream 429's `Retry-After` header, if
        /// any, and re-emitted on the 503 this maps to.
        retry_after_secs: Option<u64>,
    },

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn transient(message: impl Into<String>) -> Self {
        EngineError::Transient {
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn transient_with_retry_after(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        EngineError::Transient {
            message: message.into(),
            retry_after_secs,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Permanent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient { .. })
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            EngineError::Transient { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        };
        let body = Json(json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_with_retry_after_sets_the_header() {
        let response = EngineError::transient_with_retry_after("rate limited", Some(30)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("retry-after").unwrap(), "30");
    }

    #[test]
    fn plain_transient_omits_the_header() {
        let response = EngineError::transient("upstream down").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get("retry-after").is_none());
    }
}
