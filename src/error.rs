use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub const PROMPT_REQUIRED: &str = "Prompt is required!";

/// Failure while turning a prompt into text. Only the display string
/// reaches the caller.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Tokenizer(String),

    #[error(transparent)]
    Model(#[from] candle::Error),

    #[error("{0}")]
    Decode(String),

    #[error("invalid generation parameters: {0}")]
    InvalidParams(String),

    #[error("generation worker failed: {0}")]
    Worker(String),

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{}", PROMPT_REQUIRED)]
    PromptRequired,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body that could not be read as a request object.
    #[error("{0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Render(#[from] minijinja::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MalformedRequest(_) | AppError::Generation(_) | AppError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = AppError::from(ValidationError::PromptRequired);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Prompt is required!");
    }

    #[test]
    fn generation_keeps_underlying_message() {
        let err = AppError::from(GenerationError::Backend("CUDA out of memory".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "CUDA out of memory");
    }

    #[test]
    fn malformed_request_is_server_error() {
        let err = AppError::MalformedRequest("expected value at line 1 column 1".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "expected value at line 1 column 1");
    }
}
