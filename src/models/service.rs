//! Service listing model.

use serde::{Deserialize, Serialize};

/// An offered service shown on the services page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub description: String,
}

/// Request body for adding a service.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Request body for deleting a service or project by its unique name.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteByNameRequest {
    #[serde(default)]
    pub name: String,
}
