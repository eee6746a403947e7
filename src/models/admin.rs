//! Admin credential request model.

use serde::Deserialize;

/// Body of both the setup and the login endpoints.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCredentialsRequest {
    #[serde(default)]
    pub admin_username: String,
    #[serde(default)]
    pub admin_password: String,
}

// Keeps raw passwords out of logs.
impl std::fmt::Debug for AdminCredentialsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentialsRequest")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}
