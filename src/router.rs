use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::{Extension, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers::{hooks, meta, users};
use crate::profile::ProfileClient;
use crate::rate_limit::{self, RateLimiter};
use crate::storage::FileDirectory;
use crate::webhook::WebhookRelay;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileDirectory>,
    pub profiles: ProfileClient,
    pub relay: WebhookRelay,
    pub limiter: RateLimiter,
}

/// Request bodies are small JSON documents; anything bigger is abuse.
const BODY_LIMIT_BYTES: usize = 256 * 1024;

pub fn build(state: AppState, config: &ServerConfig) -> Router {
    let cors = build_cors_layer(&config.cors_origins);

    let mut router = Router::new()
        .route("/", get(meta::root))
        .route("/health", get(meta::health))
        .route("/api/test", get(meta::test))
        .route("/api/id", get(users::ids))
        .route("/api/users", get(users::list_profiles))
        .route("/api/users/list", get(users::list_ids))
        .route("/api/users/add", post(users::add))
        .route("/api/users/remove", delete(users::remove));

    for hook in &config.webhooks {
        router = router.route(
            &format!("/api/{}", hook.name),
            post(hooks::forward).layer(Extension(hook.clone())),
        );
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::admit,
        ))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(AllowOrigin::list(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookRoute;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use mockito::{Matcher, Server};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn temp_data_dir() -> PathBuf {
        std::env::temp_dir().join(format!("nexium-router-test-{}", Uuid::new_v4()))
    }

    fn test_config(profile_api_url: &str, webhooks: Vec<WebhookRoute>) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            data_dir: temp_data_dir(),
            profile_api_url: profile_api_url.to_string(),
            upstream_timeout: Duration::from_secs(5),
            rate_limit: 100,
            rate_window_secs: 60,
            refresh_interval_secs: 0,
            webhooks,
            cors_origins: Vec::new(),
        }
    }

    fn build_app(config: &ServerConfig) -> (Router, AppState) {
        let store = Arc::new(FileDirectory::open(&config.data_dir).unwrap());
        let client = reqwest::Client::new();
        let state = AppState {
            store,
            profiles: ProfileClient::new(&config.profile_api_url, client.clone()),
            relay: WebhookRelay::new(client),
            limiter: RateLimiter::new(config.rate_limit, config.rate_window_secs),
        };
        (build(state.clone(), config), state)
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn cleanup(config: &ServerConfig) {
        std::fs::remove_dir_all(&config.data_dir).ok();
    }

    #[tokio::test]
    async fn meta_endpoints_answer() {
        let config = test_config("http://unused.invalid", Vec::new());
        let (app, _) = build_app(&config);

        let response = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "NEXIUM" }));

        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "status": "healthy" }));

        let response = app.oneshot(get_request("/api/test")).await.unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "message": "NEXIUM ON TOP!" })
        );

        cleanup(&config);
    }

    #[tokio::test]
    async fn add_list_remove_flow() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/users/123")
            .with_status(200)
            .with_body(r#"{"id":123,"name":"builderman"}"#)
            .create_async()
            .await;

        let config = test_config(&server.url(), Vec::new());
        let (app, _) = build_app(&config);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/users/add",
                json!({ "userid": "123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "success");
        assert_eq!(body["users"], json!(["123"]));
        assert_eq!(body["addedUser"]["username"], "builderman");

        let response = app
            .clone()
            .oneshot(get_request("/api/users/list"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["users"], json!(["123"]));

        let response = app.clone().oneshot(get_request("/api/id")).await.unwrap();
        assert_eq!(body_json(response).await["message"], "123");

        let response = app
            .clone()
            .oneshot(json_request(
                Method::DELETE,
                "/api/users/remove",
                json!({ "userid": "123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "removed");
        assert_eq!(body["removedUserId"], "123");
        assert_eq!(body["users"], json!([]));

        let response = app
            .clone()
            .oneshot(get_request("/api/users/list"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["users"], json!([]));

        // A second remove finds nothing to untrack.
        let response = app
            .oneshot(json_request(
                Method::DELETE,
                "/api/users/remove",
                json!({ "userid": "123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        cleanup(&config);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected_before_any_upstream_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = test_config(&server.url(), Vec::new());
        let (app, _) = build_app(&config);

        for body in [json!({ "userid": "abc" }), json!({}), json!({ "userid": "" })] {
            let response = app
                .clone()
                .oneshot(json_request(Method::POST, "/api/users/add", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        mock.assert_async().await;
        cleanup(&config);
    }

    #[tokio::test]
    async fn duplicate_add_is_conflict_without_second_fetch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/users/55")
            .with_status(200)
            .with_body(r#"{"id":55,"name":"alice"}"#)
            .expect(1)
            .create_async()
            .await;

        let config = test_config(&server.url(), Vec::new());
        let (app, _) = build_app(&config);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/users/add",
                json!({ "userid": "55" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/users/add",
                json!({ "userid": "55" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        mock.assert_async().await;
        cleanup(&config);
    }

    #[tokio::test]
    async fn unknown_upstream_id_maps_to_bad_request() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/users/999")
            .with_status(404)
            .create_async()
            .await;

        let config = test_config(&server.url(), Vec::new());
        let (app, state) = build_app(&config);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/users/add",
                json!({ "userid": "999" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Nothing was stored.
        assert!(state.store.list_active().await.is_empty());
        cleanup(&config);
    }

    #[tokio::test]
    async fn users_endpoint_returns_fresh_profiles() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/users/7")
            .with_status(200)
            .with_body(r#"{"id":7,"name":"renamed"}"#)
            .create_async()
            .await;

        let config = test_config(&server.url(), Vec::new());
        let (app, state) = build_app(&config);
        state.store.add("7", "oldname").await.unwrap();

        let response = app.oneshot(get_request("/api/users")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "users": [{ "id": 7, "username": "renamed" }] })
        );

        // The cached record picked up the new username.
        let records = state.store.complete().await;
        assert_eq!(records[0].username, "renamed");
        cleanup(&config);
    }

    #[tokio::test]
    async fn users_endpoint_maps_upstream_failure_to_500() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/users/7")
            .with_status(503)
            .create_async()
            .await;

        let config = test_config(&server.url(), Vec::new());
        let (app, state) = build_app(&config);
        state.store.add("7", "alice").await.unwrap();

        let response = app.oneshot(get_request("/api/users")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "failed to fetch");
        cleanup(&config);
    }

    #[tokio::test]
    async fn rate_limit_rejects_with_retry_seconds() {
        let mut config = test_config("http://unused.invalid", Vec::new());
        config.rate_limit = 2;
        let (app, _) = build_app(&config);

        let limited_request = || {
            Request::builder()
                .uri("/")
                .header("x-forwarded-for", "198.51.100.7")
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(limited_request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(limited_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"], "too many requests");
        let retry = body["retry"].as_u64().unwrap();
        assert!(retry <= 60);

        // A different client is unaffected.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-forwarded-for", "198.51.100.8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        cleanup(&config);
    }

    #[tokio::test]
    async fn requests_without_a_client_address_are_admitted() {
        // oneshot requests carry no peer address; the filter fails open.
        let mut config = test_config("http://unused.invalid", Vec::new());
        config.rate_limit = 1;
        let (app, _) = build_app(&config);

        for _ in 0..3 {
            let response = app.clone().oneshot(get_request("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        cleanup(&config);
    }

    #[tokio::test]
    async fn configured_webhook_route_forwards_and_reports_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::Json(json!({ "content": "ping" })))
            .with_status(204)
            .create_async()
            .await;

        let config = test_config(
            "http://unused.invalid",
            vec![WebhookRoute {
                name: "alerts".to_string(),
                url: format!("{}/hook", server.url()),
            }],
        );
        let (app, _) = build_app(&config);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/alerts",
                json!({ "content": "ping" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "webhook forwarded successfully", "status": 204 })
        );

        mock.assert_async().await;
        cleanup(&config);
    }

    #[tokio::test]
    async fn webhook_upstream_failure_maps_to_500() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let config = test_config(
            "http://unused.invalid",
            vec![WebhookRoute {
                name: "alerts".to_string(),
                url: format!("{}/hook", server.url()),
            }],
        );
        let (app, _) = build_app(&config);

        let response = app
            .oneshot(json_request(Method::POST, "/api/alerts", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "failed to forward webhook"
        );

        cleanup(&config);
    }
}
