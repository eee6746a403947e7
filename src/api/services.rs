//! Service API endpoints.

use axum::{extract::State, Json};

use super::{success, ApiResult, MessageResponse};
use crate::errors::AppError;
use crate::models::{CreateServiceRequest, DeleteByNameRequest, Service};
use crate::validation::{sanitize_text, Validator};
use crate::AppState;

/// GET /api/services - List services in insertion order.
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<Service>>> {
    let services = state.repo.list_services().await?;
    Ok(Json(services))
}

/// GET /api/admin/services - Same listing for the admin page.
pub async fn list_admin_services(State(state): State<AppState>) -> ApiResult<Json<Vec<Service>>> {
    list_services(State(state)).await
}

/// POST /api/addService - Add a service.
pub async fn add_service(
    State(state): State<AppState>,
    Json(request): Json<CreateServiceRequest>,
) -> ApiResult<MessageResponse> {
    let mut v = Validator::new();
    v.field(&request.name).required("Service name is required");
    v.field(&request.description)
        .required("Service description is required");
    v.finish().map_err(AppError::Validation)?;

    let service = Service {
        name: sanitize_text(&request.name),
        description: sanitize_text(&request.description),
    };
    state.repo.create_service(&service).await?;
    tracing::info!(name = %service.name, "service added");

    success("Service added successfully!")
}

/// DELETE /api/deleteService - Remove a service by name.
pub async fn delete_service(
    State(state): State<AppState>,
    Json(request): Json<DeleteByNameRequest>,
) -> ApiResult<MessageResponse> {
    let mut v = Validator::new();
    v.field(&request.name).required("Service name is required");
    v.finish().map_err(AppError::Validation)?;

    let name = sanitize_text(&request.name);
    state.repo.delete_service(&name).await?;
    tracing::info!(name = %name, "service deleted");

    success("Service deleted successfully!")
}
