//! Error types for the grade relay.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{callback::CallbackError, launch::LaunchError};

/// Application-level errors returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            // Partners expect the bare outcome code as the JSON body.
            RelayError::Callback(e) => {
                let status = match e.code() {
                    "forbidden" => StatusCode::FORBIDDEN,
                    "invalid_signature" => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, Json(json!(e.code()))).into_response()
            }
            RelayError::BlockNotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("Block not found: {id}") })),
            )
                .into_response(),
            RelayError::Launch(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Launch error: {e}") })),
            )
                .into_response(),
        }
    }
}
