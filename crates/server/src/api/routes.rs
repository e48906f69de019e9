use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::get_status))
        .route("/status/{instance}", get(handlers::get_instance_status))
        .route("/config", get(handlers::get_config));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrwarden_core::config::ConnectivityConfig;
    use arrwarden_core::{load_config_from_str, Supervisor};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
[qbittorrent]
url = "http://localhost:8080"
username = "admin"
password = "hunter2"

[[instances]]
name = "tv"
kind = "sonarr"
uri = "http://localhost:8989"
api_key = "sonarr-secret"
"#;

    fn test_state() -> Arc<AppState> {
        let config = load_config_from_str(CONFIG).unwrap();
        let supervisor = Supervisor::from_workers(
            Vec::new(),
            Vec::new(),
            ConnectivityConfig {
                enabled: false,
                ..Default::default()
            },
        );
        Arc::new(AppState::new(
            config,
            "abc123".to_string(),
            Arc::new(supervisor),
        ))
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(create_router(test_state()), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_config_redacts_secrets() {
        let (status, body) = get(create_router(test_state()), "/api/v1/config").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("hunter2"));
        assert!(!body.contains("sonarr-secret"));

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["qbittorrent"]["password_configured"], true);
        assert_eq!(json["instances"][0]["api_key_configured"], true);
    }

    #[tokio::test]
    async fn test_status_reports_supervisor() {
        let (status, body) = get(create_router(test_state()), "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["config_hash"], "abc123");
        assert_eq!(json["restarts"], 0);
        assert_eq!(json["workers"].as_array().unwrap().len(), 0);
        assert_eq!(json["online"], true);
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let (status, body) = get(create_router(test_state()), "/api/v1/status/movies").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("movies"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (status, body) = get(create_router(test_state()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("arrwarden_workers_running"));
    }
}
