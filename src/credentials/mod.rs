//! Admin credential store.
//!
//! Passwords are concatenated with the server-wide pepper and hashed with
//! Argon2 using a random per-record salt. Records are keyed by username and
//! written with a single upsert, so a username never has more than one hash.

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::ConfigError;
use crate::db::Repository;
use crate::validation::Validator;

pub const PASSWORD_MIN_LEN: usize = 8;

/// Errors of the credential workflows.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Unknown user and wrong password are deliberately the same error.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("hashing error: {0}")]
    Hash(String),
    #[error("repository error: {0}")]
    Repository(#[from] sqlx::Error),
}

/// Proof of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub username: String,
}

/// Check a raw password against the complexity policy, reporting every failed rule.
pub fn password_policy(password: &str) -> Result<(), Vec<String>> {
    let mut v = Validator::new();
    v.field(password)
        .required("Password is required")
        .min_len(PASSWORD_MIN_LEN, "Password must be at least 8 characters")
        .contains_digit("Password must contain a number")
        .contains_uppercase("Password must contain a capital letter");
    v.finish()
}

/// Upsert-and-verify workflow for admin accounts.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<Repository>,
    pepper: Arc<str>,
    // Verified against when the username is unknown, so both failure paths cost a hash.
    dummy_hash: Arc<str>,
}

impl CredentialStore {
    /// Create the store. Fails when the pepper is empty or hashing does not work,
    /// both of which must stop the server at startup.
    pub fn new(repo: Arc<Repository>, pepper: &str) -> Result<Self, ConfigError> {
        if pepper.is_empty() {
            return Err(ConfigError::MissingPepper);
        }
        let pepper: Arc<str> = Arc::from(pepper);
        let dummy_hash = hash_peppered("startup-self-check", &pepper)
            .map_err(|e| ConfigError::Hasher(e.to_string()))?;

        Ok(Self {
            repo,
            pepper,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Set the password of `username`, creating the account if needed.
    ///
    /// Creating and overwriting are reported identically.
    pub async fn set_credential(
        &self,
        username: &str,
        raw_password: &str,
    ) -> Result<(), CredentialError> {
        let username = username.trim();

        let mut v = Validator::new();
        v.field(username).required("Username is required");
        let mut violations = v.finish().err().unwrap_or_default();
        if let Err(password_violations) = password_policy(raw_password) {
            violations.extend(password_violations);
        }
        if !violations.is_empty() {
            return Err(CredentialError::Validation(violations));
        }

        let password = raw_password.to_string();
        let pepper = self.pepper.clone();
        let hash = tokio::task::spawn_blocking(move || hash_peppered(&password, &pepper))
            .await
            .map_err(|e| CredentialError::Hash(e.to_string()))??;

        self.repo.upsert_admin(username, &hash).await?;
        tracing::info!(username = %username, "admin credentials stored");
        Ok(())
    }

    /// Check `raw_password` against the stored hash of `username`.
    pub async fn verify_credential(
        &self,
        username: &str,
        raw_password: &str,
    ) -> Result<Authenticated, CredentialError> {
        let username = username.trim();
        let stored = self.repo.get_admin_hash(username).await?;
        let known = stored.is_some();
        let hash = stored.unwrap_or_else(|| self.dummy_hash.to_string());

        let password = raw_password.to_string();
        let pepper = self.pepper.clone();
        let matches = tokio::task::spawn_blocking(move || verify_peppered(&password, &pepper, &hash))
            .await
            .map_err(|e| CredentialError::Hash(e.to_string()))??;

        if known && matches {
            Ok(Authenticated {
                username: username.to_string(),
            })
        } else {
            tracing::debug!(username = %username, "admin login rejected");
            Err(CredentialError::InvalidCredentials)
        }
    }
}

fn hash_peppered(password: &str, pepper: &str) -> Result<String, CredentialError> {
    let peppered = format!("{password}{pepper}");
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(peppered.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

fn verify_peppered(password: &str, pepper: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|e| CredentialError::Hash(e.to_string()))?;
    let peppered = format!("{password}{pepper}");
    Ok(Argon2::default()
        .verify_password(peppered.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn store(pepper: &str) -> (CredentialStore, Arc<Repository>, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        let repo = Arc::new(Repository::new(pool));
        let store = CredentialStore::new(repo.clone(), pepper).unwrap();
        (store, repo, dir)
    }

    #[tokio::test]
    async fn test_set_then_verify() {
        let (store, _repo, _dir) = store("pepper").await;
        store.set_credential("admin", "Passw0rd").await.unwrap();

        let auth = store.verify_credential("admin", "Passw0rd").await.unwrap();
        assert_eq!(auth.username, "admin");
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_are_indistinguishable() {
        let (store, _repo, _dir) = store("pepper").await;
        store.set_credential("admin", "Passw0rd").await.unwrap();

        let wrong = store.verify_credential("admin", "wrong").await.unwrap_err();
        let unknown = store.verify_credential("nouser", "x").await.unwrap_err();

        assert!(matches!(wrong, CredentialError::InvalidCredentials));
        assert!(matches!(unknown, CredentialError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_reset_overwrites_previous_password() {
        let (store, repo, _dir) = store("pepper").await;
        store.set_credential("admin", "Passw0rd").await.unwrap();
        store.set_credential("admin", "N3wSecret").await.unwrap();

        assert!(store.verify_credential("admin", "Passw0rd").await.is_err());
        assert!(store.verify_credential("admin", "N3wSecret").await.is_ok());
        assert_eq!(repo.count_admins("admin").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pepper_is_part_of_the_hash() {
        let (store, repo, _dir) = store("pepper-a").await;
        store.set_credential("admin", "Passw0rd").await.unwrap();

        let other = CredentialStore::new(repo, "pepper-b").unwrap();
        assert!(other.verify_credential("admin", "Passw0rd").await.is_err());
    }

    #[tokio::test]
    async fn test_stored_hash_is_not_the_password() {
        let (store, repo, _dir) = store("pepper").await;
        store.set_credential("admin", "Passw0rd").await.unwrap();

        let hash = repo.get_admin_hash("admin").await.unwrap().unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("Passw0rd"));
    }

    #[tokio::test]
    async fn test_policy_rejection_stores_nothing() {
        let (store, repo, _dir) = store("pepper").await;
        let err = store.set_credential("admin", "short1").await.unwrap_err();

        match err {
            CredentialError::Validation(messages) => {
                assert!(messages.contains(&"Password must be at least 8 characters".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(repo.count_admins("admin").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_username_is_rejected_with_password_rules() {
        let (store, _repo, _dir) = store("pepper").await;
        let err = store.set_credential("  ", "nodigits").await.unwrap_err();

        match err {
            CredentialError::Validation(messages) => assert_eq!(
                messages,
                vec![
                    "Username is required",
                    "Password must contain a number",
                    "Password must contain a capital letter",
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_pepper_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();

        let err = CredentialStore::new(Arc::new(Repository::new(pool)), "").err();
        assert!(matches!(err, Some(ConfigError::MissingPepper)));
    }

    #[test]
    fn test_password_policy_rules() {
        let length = password_policy("short1").unwrap_err();
        assert_eq!(
            length,
            vec![
                "Password must be at least 8 characters",
                "Password must contain a capital letter",
            ]
        );

        let upper = password_policy("alllowercase1").unwrap_err();
        assert_eq!(upper, vec!["Password must contain a capital letter"]);

        let digit = password_policy("NoDigitsHere").unwrap_err();
        assert_eq!(digit, vec!["Password must contain a number"]);

        let all = password_policy("").unwrap_err();
        assert_eq!(all.len(), 4);

        assert!(password_policy("Passw0rd").is_ok());
    }
}
