//! Database repository for CRUD operations.
//!
//! Every write is a single statement, so each call is atomic on its own.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{Project, Service};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== SERVICE OPERATIONS ====================

    /// List all services in insertion order.
    pub async fn list_services(&self) -> Result<Vec<Service>, AppError> {
        let rows = sqlx::query("SELECT name, description FROM services ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| service_from_row(&row)).collect())
    }

    /// Add a service. Names are unique; a duplicate is a conflict.
    pub async fn create_service(&self, service: &Service) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO services (name, description, created_at) VALUES (?, ?, ?)")
            .bind(&service.name)
            .bind(&service.description)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("Service {} already exists", service.name)))?;

        Ok(())
    }

    /// Delete a service by name.
    pub async fn delete_service(&self, name: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM services WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Service not found!".to_string()));
        }
        Ok(())
    }

    // ==================== PROJECT OPERATIONS ====================

    /// List all projects in insertion order.
    pub async fn list_projects(&self) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query("SELECT name, description, image_path FROM projects ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| project_from_row(&row)).collect())
    }

    /// Get a project by name.
    pub async fn get_project(&self, name: &str) -> Result<Option<Project>, AppError> {
        let row = sqlx::query("SELECT name, description, image_path FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(project_from_row))
    }

    /// Add a project. Names are unique; a duplicate is a conflict.
    pub async fn create_project(&self, project: &Project) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO projects (name, description, image_path, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.image_path)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("Project {} already exists", project.name)))?;

        Ok(())
    }

    /// Delete a project by name.
    pub async fn delete_project(&self, name: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM projects WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Project not found!".to_string()));
        }
        Ok(())
    }

    // ==================== ADMIN OPERATIONS ====================

    /// Insert or overwrite the password hash of an admin in one statement.
    pub async fn upsert_admin(&self, username: &str, password_hash: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO admins (username, password_hash, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(username) DO UPDATE SET
                password_hash = excluded.password_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the stored password hash of an admin.
    pub async fn get_admin_hash(&self, username: &str) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT password_hash FROM admins WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("password_hash")))
    }

    /// Number of admin records stored for a username (0 or 1).
    #[cfg(test)]
    pub async fn count_admins(&self, username: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM admins WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("n"))
    }
}

fn conflict_or(err: sqlx::Error, message: String) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(message),
        _ => AppError::from(err),
    }
}

fn service_from_row(row: &sqlx::sqlite::SqliteRow) -> Service {
    Service {
        name: row.get("name"),
        description: row.get("description"),
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Project {
    Project {
        name: row.get("name"),
        description: row.get("description"),
        image_path: row.get("image_path"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        (Repository::new(pool), dir)
    }

    fn service(name: &str) -> Service {
        Service {
            name: name.to_string(),
            description: format!("{} description", name),
        }
    }

    #[tokio::test]
    async fn test_services_keep_insertion_order() {
        let (repo, _dir) = repo().await;
        for name in ["Zeta", "Alpha", "Mid"] {
            repo.create_service(&service(name)).await.unwrap();
        }

        let names: Vec<String> = repo
            .list_services()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[tokio::test]
    async fn test_duplicate_service_is_conflict() {
        let (repo, _dir) = repo().await;
        repo.create_service(&service("Web")).await.unwrap();

        let err = repo.create_service(&service("Web")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_service_is_not_found() {
        let (repo, _dir) = repo().await;
        let err = repo.delete_service("Nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_project_lookup_and_delete() {
        let (repo, _dir) = repo().await;
        let project = Project {
            name: "Bridge".to_string(),
            description: "A bridge".to_string(),
            image_path: "/assets/bridge-1.png".to_string(),
        };
        repo.create_project(&project).await.unwrap();

        assert_eq!(repo.get_project("Bridge").await.unwrap(), Some(project));
        repo.delete_project("Bridge").await.unwrap();
        assert_eq!(repo.get_project("Bridge").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_admin_keeps_single_record() {
        let (repo, _dir) = repo().await;
        repo.upsert_admin("admin", "hash-1").await.unwrap();
        repo.upsert_admin("admin", "hash-2").await.unwrap();

        assert_eq!(repo.count_admins("admin").await.unwrap(), 1);
        assert_eq!(
            repo.get_admin_hash("admin").await.unwrap().as_deref(),
            Some("hash-2")
        );
    }
}
