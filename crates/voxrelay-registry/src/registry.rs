//! In-memory app table and health-check sweep. Grounded on
//! `app_registry/main.py`'s `AppRegistry`, persisted per-process rather
//! than per-database-row since the original never persists registrations
//! across restarts either — apps simply re-register on boot.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use voxrelay_core::{AppHealth, RegisteredApp};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};

pub struct Registry {
    apps: DashMap<String, RegisteredApp>,
    http: reqwest::Client,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            apps: DashMap::new(),
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn register_app(&self, app_id: &str, container_url: &str, manifest: serde_json::Value) -> RegisteredApp {
        let app = RegisteredApp {
            app_id: app_id.to_string(),
            container_url: container_url.to_string(),
            manifest,
            status: AppHealth::Unknown,
            registered_at: Utc::now(),
            last_health_check: None,
            health_check_failures: 0,
        };
        self.apps.insert(app_id.to_string(), app.clone());
        info!(app_id, container_url, "app registered");
        app
    }

    pub fn get_app(&self, app_id: &str) -> Option<RegisteredApp> {
        self.apps.get(app_id).map(|a| a.clone())
    }

    pub fn list_apps(&self) -> Vec<RegisteredApp> {
        self.apps.iter().map(|a| a.clone()).collect()
    }

    pub async fn proxy_action(&self, app_id: &str, action: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let container_url = self
            .get_app(app_id)
            .ok_or_else(|| RegistryError::UnknownApp(app_id.to_string()))?
            .container_url;

        let response = self
            .http
            .post(format!("{container_url}/api/v1/actions/{action}"))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// One pass of the health-check sweep: GET `/healthz` on every
    /// registered app, updating status according to the failure-threshold
    /// rule.
    pub async fn check_all(&self) {
        let app_ids: Vec<String> = self.apps.iter().map(|a| a.key().clone()).collect();
        for app_id in app_ids {
            self.check_one(&app_id).await;
        }
    }

    async fn check_one(&self, app_id: &str) {
        let Some(container_url) = self.get_app(app_id).map(|a| a.container_url) else { return };
        let healthy = matches!(
            self.http.get(format!("{container_url}/healthz")).send().await,
            Ok(resp) if resp.status().is_success()
        );

        let Some(mut entry) = self.apps.get_mut(app_id) else { return };
        entry.last_health_check = Some(Utc::now());
        if healthy {
            if entry.status != AppHealth::Healthy {
                info!(app_id, "app is now healthy");
            }
            entry.status = AppHealth::Healthy;
            entry.health_check_failures = 0;
        } else {
            entry.health_check_failures += 1;
            if entry.health_check_failures >= self.config.unhealthy_threshold && entry.status != AppHealth::Unhealthy {
                warn!(app_id, failures = entry.health_check_failures, "app is now unhealthy");
                entry.status = AppHealth::Unhealthy;
            }
        }
    }
}

pub async fn run_health_check_loop(registry: std::sync::Arc<Registry>) {
    let interval = registry.config.health_check_interval_secs;
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
        registry.check_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_app_starts_unknown() {
        let registry = Registry::new(RegistryConfig::for_tests());
        let app = registry.register_app("calendar_app", "http://calendar:9000", serde_json::json!({}));
        assert_eq!(app.status, AppHealth::Unknown);
        assert_eq!(registry.list_apps().len(), 1);
    }

    #[test]
    fn re_registering_updates_container_url() {
        let registry = Registry::new(RegistryConfig::for_tests());
        registry.register_app("calendar_app", "http://old:9000", serde_json::json!({}));
        registry.register_app("calendar_app", "http://new:9000", serde_json::json!({}));
        assert_eq!(registry.get_app("calendar_app").unwrap().container_url, "http://new:9000");
        assert_eq!(registry.list_apps().len(), 1);
    }

    #[tokio::test]
    async fn proxy_action_against_unknown_app_errors() {
        let registry = Registry::new(RegistryConfig::for_tests());
        let result = registry.proxy_action("nonexistent", "do_thing", serde_json::json!({})).await;
        assert!(matches!(result, Err(RegistryError::UnknownApp(_))));
    }
}
