//! REST API module.
//!
//! Contains the public site routes and the PSK-guarded admin routes.

mod admin;
mod contact;
mod projects;
mod services;

pub use admin::*;
pub use contact::*;
pub use projects::*;
pub use services::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Envelope of every successful mutation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            msg: msg.into(),
        }
    }
}

impl IntoResponse for MessageResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<T, AppError>;

/// Create a successful mutation response.
pub fn success(msg: impl Into<String>) -> ApiResult<MessageResponse> {
    Ok(MessageResponse::new(msg))
}
