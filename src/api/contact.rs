//! Contact form endpoint.

use axum::{extract::State, Json};

use super::{success, ApiResult, MessageResponse};
use crate::errors::AppError;
use crate::mail::ContactMessage;
use crate::models::ContactRequest;
use crate::validation::{normalize_email, sanitize_text, Validator};
use crate::AppState;

/// POST /api/contact - Relay a contact form submission to the company inbox.
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(request): Json<ContactRequest>,
) -> ApiResult<MessageResponse> {
    let mut v = Validator::new();
    v.field(&request.name).required("Name is required");
    v.field(&request.email).email("Email is required");
    v.field(&request.message).required("Message is required");
    v.finish().map_err(AppError::Validation)?;

    let message = ContactMessage::from_submission(
        &state.config.mail,
        &sanitize_text(&request.name),
        &normalize_email(&request.email),
        &sanitize_text(&request.message),
    );

    if let Err(e) = state.mailer.send(&message).await {
        tracing::error!("Error sending contact message: {}", e);
        return Err(AppError::Relay("Failed to send message".to_string()));
    }

    success("Message sent successfully")
}
