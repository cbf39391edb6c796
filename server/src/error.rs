use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::derive::Display;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug, Display)]
pub enum AppError {
    /// Required secrets are absent. Carries every missing name, not just the
    /// first, so one failed run reports the whole configuration gap.
    #[display("Missing required environment variables: {}", _0.join(", "))]
    MissingConfig(Vec<String>),
    /// The chat API answered with its own error envelope.
    #[display("Chat API error: {_0}")]
    ChatApi(String),
    #[display("{_0}")]
    Internal(anyhow::Error),
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        AppError::Internal(error.into())
    }
}

// This centralizes all different errors from our app in one place.
// Every uncaught error becomes a 500 with the digest wire shape.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        tracing::error!("Request failed: {}", message);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_lists_every_name() {
        let err = AppError::MissingConfig(vec![
            "GMAIL_CLIENT_ID".to_string(),
            "GMAIL_REFRESH_TOKEN".to_string(),
        ]);

        assert_eq!(
            err.to_string(),
            "Missing required environment variables: GMAIL_CLIENT_ID, GMAIL_REFRESH_TOKEN"
        );
    }

    #[test]
    fn internal_error_keeps_underlying_message() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
    }
}
