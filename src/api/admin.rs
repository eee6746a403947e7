//! Admin credential endpoints.

use axum::{extract::State, Json};

use super::{success, ApiResult, MessageResponse};
use crate::errors::AppError;
use crate::models::AdminCredentialsRequest;
use crate::validation::Validator;
use crate::AppState;

/// POST /api/setup-admin - Create the admin account or replace its password.
pub async fn setup_admin(
    State(state): State<AppState>,
    Json(request): Json<AdminCredentialsRequest>,
) -> ApiResult<MessageResponse> {
    state
        .credentials
        .set_credential(&request.admin_username, &request.admin_password)
        .await?;

    success("Admin password setup successful")
}

/// POST /api/login-admin - Check admin credentials.
pub async fn login_admin(
    State(state): State<AppState>,
    Json(request): Json<AdminCredentialsRequest>,
) -> ApiResult<MessageResponse> {
    let mut v = Validator::new();
    v.field(&request.admin_username)
        .required("Username is required");
    v.field(&request.admin_password)
        .required("Password is required");
    v.finish().map_err(AppError::Validation)?;

    let admin = state
        .credentials
        .verify_credential(&request.admin_username, &request.admin_password)
        .await?;
    tracing::info!(username = %admin.username, "admin logged in");

    success("Login successful")
}
