//! Project showcase model.

use serde::{Deserialize, Serialize};

/// A showcased project with its server-relative image path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub description: String,
    pub image_path: String,
}

/// Project as listed on the admin page, without its image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub description: String,
}

impl From<Project> for ProjectSummary {
    fn from(project: Project) -> Self {
        Self {
            name: project.name,
            description: project.description,
        }
    }
}
