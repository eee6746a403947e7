//! Site-facing facade over [`ContentCache`] with the services and projects collections.

use std::env;
use std::time::Duration;

use super::{CacheError, CollectionSpec, ContentCache, HttpContentSource, KeyValueStore};
use crate::models::{Project, Service};

/// Client settings for the site content cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the site backend
    pub backend_url: String,
    /// Services change often, so they go stale quickly
    pub services_ttl: Duration,
    /// Project images rarely change
    pub projects_ttl: Duration,
    pub fetch_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3000".to_string(),
            services_ttl: Duration::from_secs(30),
            projects_ttl: Duration::from_secs(24 * 60 * 60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load client settings from environment variables, keeping defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| match v.parse::<u64>() {
                    Ok(n) => Some(Duration::from_secs(n)),
                    Err(e) => {
                        tracing::warn!("Invalid {key} value {v:?}: {e}, using default");
                        None
                    }
                })
                .unwrap_or(default)
        };

        Self {
            backend_url: lookup("SITE_BACKEND_URL").unwrap_or(defaults.backend_url),
            services_ttl: secs("SITE_SERVICES_TTL_SECS", defaults.services_ttl),
            projects_ttl: secs("SITE_PROJECTS_TTL_SECS", defaults.projects_ttl),
            fetch_timeout: secs("SITE_FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
        }
    }

    pub fn services_spec(&self) -> CollectionSpec {
        CollectionSpec::services(self.services_ttl)
    }

    pub fn projects_spec(&self) -> CollectionSpec {
        CollectionSpec::projects(self.projects_ttl)
    }
}

/// Cached access to the site's services and projects.
pub struct SiteContent<S> {
    cache: ContentCache<S, HttpContentSource>,
    services: CollectionSpec,
    projects: CollectionSpec,
}

impl<S: KeyValueStore> SiteContent<S> {
    pub fn new(config: &ClientConfig, store: S) -> Result<Self, CacheError> {
        let source = HttpContentSource::new(config.backend_url.clone(), config.fetch_timeout)?;
        Ok(Self {
            cache: ContentCache::new(store, source),
            services: config.services_spec(),
            projects: config.projects_spec(),
        })
    }

    pub fn cache(&self) -> &ContentCache<S, HttpContentSource> {
        &self.cache
    }

    pub async fn services(&self) -> Result<Vec<Service>, CacheError> {
        self.cache.load(&self.services).await
    }

    pub async fn projects(&self) -> Result<Vec<Project>, CacheError> {
        self.cache.load(&self.projects).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.services_spec().timestamp_key, "lastUpdatedServices");
        assert_eq!(config.projects_spec().timestamp_key, "lastUpdated");
        assert!(config.projects_ttl > config.services_ttl);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("SITE_BACKEND_URL", "https://api.synapse.test"),
            ("SITE_SERVICES_TTL_SECS", "5"),
            ("SITE_PROJECTS_TTL_SECS", "soon"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.backend_url, "https://api.synapse.test");
        assert_eq!(config.services_ttl, Duration::from_secs(5));
        assert_eq!(config.projects_ttl, ClientConfig::default().projects_ttl);
    }
}
