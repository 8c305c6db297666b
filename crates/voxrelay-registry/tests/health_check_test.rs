//! Integration test for the health-check sweep: a toy `/healthz`
//! backend that can be flipped unhealthy on demand, checked against the
//! real `unhealthy_threshold` failure-counting logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use serial_test::serial;
use voxrelay_core::AppHealth;
use voxrelay_registry::config::RegistryConfig;
use voxrelay_registry::registry::Registry;

/// Spawns a tiny `/healthz` server whose response can be toggled, returning
/// its base URL and the toggle switch.
async fn spawn_toy_app() -> (String, Arc<AtomicBool>) {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let app = Router::new().route(
        "/healthz",
        get(move || {
            let flag = flag.clone();
            async move {
                if flag.load(Ordering::SeqCst) {
                    (axum::http::StatusCode::OK, "ok")
                } else {
                    (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down")
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), healthy)
}

fn config() -> RegistryConfig {
    RegistryConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        internal_api_key: "test-internal-key".to_string(),
        health_check_interval_secs: 30,
        unhealthy_threshold: 2,
    }
}

#[tokio::test]
#[serial]
async fn a_newly_registered_app_becomes_healthy_after_one_successful_check() {
    let (url, _healthy) = spawn_toy_app().await;
    let registry = Registry::new(config());
    registry.register_app("calendar_app", &url, serde_json::json!({}));

    registry.check_all().await;

    assert_eq!(registry.get_app("calendar_app").unwrap().status, AppHealth::Healthy);
}

#[tokio::test]
#[serial]
async fn an_app_is_marked_unhealthy_only_after_the_configured_consecutive_failures() {
    let (url, healthy) = spawn_toy_app().await;
    let registry = Registry::new(config()); // unhealthy_threshold = 2
    registry.register_app("flaky_app", &url, serde_json::json!({}));
    registry.check_all().await;
    assert_eq!(registry.get_app("flaky_app").unwrap().status, AppHealth::Healthy);

    healthy.store(false, Ordering::SeqCst);

    registry.check_all().await;
    assert_eq!(
        registry.get_app("flaky_app").unwrap().status,
        AppHealth::Healthy,
        "one failure must not flip status below the threshold"
    );

    registry.check_all().await;
    assert_eq!(registry.get_app("flaky_app").unwrap().status, AppHealth::Unhealthy);
}

#[tokio::test]
#[serial]
async fn recovering_resets_the_failure_counter_and_status() {
    let (url, healthy) = spawn_toy_app().await;
    let registry = Registry::new(config());
    registry.register_app("app", &url, serde_json::json!({}));

    healthy.store(false, Ordering::SeqCst);
    registry.check_all().await;
    registry.check_all().await;
    assert_eq!(registry.get_app("app").unwrap().status, AppHealth::Unhealthy);

    healthy.store(true, Ordering::SeqCst);
    registry.check_all().await;
    let app = registry.get_app("app").unwrap();
    assert_eq!(app.status, AppHealth::Healthy);
    assert_eq!(app.health_check_failures, 0);
}

#[tokio::test]
#[serial]
async fn an_unreachable_app_counts_as_a_failed_check() {
    let registry = Registry::new(RegistryConfig { unhealthy_threshold: 1, ..config() });
    registry.register_app("ghost_app", "http://127.0.0.1:1", serde_json::json!({}));

    registry.check_all().await;

    assert_eq!(registry.get_app("ghost_app").unwrap().status, AppHealth::Unhealthy);
}
