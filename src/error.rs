use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed selector: {0}")]
    MalformedSelector(String),

    #[error("Selector operator '{operator}' on key '{key}' not supported. Only equals is supported at this time")]
    UnsupportedOperator { key: String, operator: String },

    #[error("Selector label '{0}' not supported")]
    UnknownSelectorKey(String),

    #[error("Malformed filter '{0}': expected field_operator_value")]
    MalformedFilter(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Document '{id}' not found in {database}/{collection}")]
    DocumentNotFound {
        database: String,
        collection: String,
        id: String,
    },

    #[error("Field '{0}' not found in document")]
    FieldNotFound(String),

    #[error("Value '{value}' of field '{field}' is not an integer")]
    ValueNotNumeric { field: String, value: String },

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// True for errors caused by the query itself rather than the backend.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            BridgeError::MalformedSelector(_)
                | BridgeError::UnsupportedOperator { .. }
                | BridgeError::UnknownSelectorKey(_)
                | BridgeError::MalformedFilter(_)
                | BridgeError::MissingField(_)
        )
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl From<mongodb::error::Error> for BridgeError {
    fn from(err: mongodb::error::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            _ if self.is_invalid_request() => StatusCode::BAD_REQUEST,
            BridgeError::DocumentNotFound { .. }
            | BridgeError::FieldNotFound(_)
            | BridgeError::MetricNotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::ValueNotNumeric { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BridgeError::BackendUnavailable(_) | BridgeError::Transport(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
