//! Project API endpoints, including the multipart image upload.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};

use super::{success, ApiResult, MessageResponse};
use crate::errors::AppError;
use crate::models::{DeleteByNameRequest, Project, ProjectSummary};
use crate::validation::{sanitize_text, Validator};
use crate::AppState;

/// GET /api/projects - List projects with their image paths.
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    let projects = state.repo.list_projects().await?;
    Ok(Json(projects))
}

/// GET /api/admin/projects - List projects without image paths.
pub async fn list_admin_projects(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ProjectSummary>>> {
    let projects = state.repo.list_projects().await?;
    Ok(Json(projects.into_iter().map(ProjectSummary::from).collect()))
}

struct UploadedImage {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// POST /api/addProject - Add a project from a multipart form with `name`,
/// `description` and an `image` file.
pub async fn add_project(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<MessageResponse> {
    let mut name = String::new();
    let mut description = String::new();
    let mut image: Option<UploadedImage> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => name = field.text().await.map_err(multipart_error)?,
            Some("description") => description = field.text().await.map_err(multipart_error)?,
            Some("image") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part when no file was chosen
                if !file_name.is_empty() || !bytes.is_empty() {
                    image = Some(UploadedImage {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let mut v = Validator::new();
    v.field(&name).required("Project name is required");
    v.field(&description)
        .required("Project description is required");
    v.finish().map_err(AppError::Validation)?;

    let image = image.ok_or_else(|| AppError::BadRequest("No file selected!".to_string()))?;
    let image_path = state
        .images
        .save(&image.file_name, &image.content_type, &image.bytes)
        .await?;

    let project = Project {
        name: sanitize_text(&name),
        description: sanitize_text(&description),
        image_path,
    };
    if let Err(e) = state.repo.create_project(&project).await {
        if let Err(cleanup) = state.images.remove(&project.image_path).await {
            tracing::warn!("Failed to remove orphaned image: {}", cleanup);
        }
        return Err(e);
    }
    tracing::info!(name = %project.name, image = %project.image_path, "project added");

    success("Project added successfully!")
}

/// DELETE /api/deleteProject - Remove a project and its image.
pub async fn delete_project(
    State(state): State<AppState>,
    Json(request): Json<DeleteByNameRequest>,
) -> ApiResult<MessageResponse> {
    let mut v = Validator::new();
    v.field(&request.name).required("Project name is required");
    v.finish().map_err(AppError::Validation)?;

    let name = sanitize_text(&request.name);
    let project = state
        .repo
        .get_project(&name)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found!".to_string()))?;

    state.images.remove(&project.image_path).await?;
    state.repo.delete_project(&name).await?;
    tracing::info!(name = %name, "project deleted");

    success("Project deleted successfully!")
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Image exceeds the upload size limit".to_string())
    } else {
        AppError::BadRequest(err.body_text())
    }
}
