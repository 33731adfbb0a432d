use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised anywhere in the rekap pipeline
///
/// Handlers never build error responses themselves; they return a `RekapError` and
/// the `IntoResponse` impl below renders it once at the top of the request.
#[derive(Error, Debug)]
pub enum RekapError {
    /// A required request field is missing or malformed
    #[error("{0}")]
    Validation(String),

    /// The master sheet is empty or lacks the columns the engine needs
    #[error("{0}")]
    DataUnavailable(String),

    /// The spreadsheet service answered with a non-success status
    #[error("Sheets API error: {status} {message}")]
    RemoteService { status: u16, message: String },

    /// Token issuance failed or the service account is incomplete
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The outbound call never produced a response
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Local cache could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type RekapResult<T> = Result<T, RekapError>;

impl From<reqwest::Error> for RekapError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return RekapError::RemoteService {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        RekapError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RekapError {
    fn from(err: serde_json::Error) -> Self {
        RekapError::Transport(format!("invalid JSON: {}", err))
    }
}

impl RekapError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RekapError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RekapError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = RekapError::Validation("Date, shift and operator are required".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn remote_and_data_errors_map_to_500() {
        let remote = RekapError::RemoteService {
            status: 403,
            message: "Forbidden".into(),
        };
        assert_eq!(remote.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(remote.to_string(), "Sheets API error: 403 Forbidden");

        let missing = RekapError::DataUnavailable("No data found in sheet MS".into());
        assert_eq!(missing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
