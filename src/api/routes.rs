use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::enforce_guard;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.upload.max_upload_size as usize;

    // Routes that mint grants or accept authoring input sit behind the guard
    let guarded = Router::new()
        .route("/api/s3/upload", post(handlers::issue_upload_url))
        .route("/api/courses/validate", post(handlers::validate_course))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            enforce_guard,
        ));

    let mut router = Router::new()
        .merge(guarded)
        .route("/api/s3/delete", delete(handlers::delete_upload))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Local backend: this process is the storage endpoint the signed URLs target
    if state.local_store.is_some() {
        tracing::info!("Local storage backend enabled; serving /_local/objects");
        router = router.route(
            "/_local/objects/:key",
            put(handlers::receive_signed_put)
                .layer(DefaultBodyLimit::max(upload_limit))
                .get(handlers::serve_object),
        );
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::testutil::{test_state, TEST_TOKEN};

    const BROWSER: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) Safari/605.1.15";

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, BROWSER)
            .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn descriptor() -> Value {
        json!({
            "fileName": "cover.png",
            "contentType": "image/png",
            "sizeBytes": 11,
            "isImage": true
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_issue_grant() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(json_request(Method::POST, "/api/s3/upload", descriptor()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        let key = body["data"]["storageKey"].as_str().unwrap();
        assert!(key.ends_with("-cover.png"));
        let url = body["data"]["uploadUrl"].as_str().unwrap();
        assert!(url.contains(&format!("/_local/objects/{key}?")));
    }

    #[tokio::test]
    async fn test_issue_grant_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/s3/upload",
                json!({"fileName": "", "contentType": "image/png", "sizeBytes": 0, "isImage": true}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["status"], "fail");
        let fields: Vec<&str> = body["data"]["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["fileName", "sizeBytes"]);
    }

    #[tokio::test]
    async fn test_issue_grant_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/s3/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, BROWSER)
            .body(Body::from(descriptor().to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bot_and_rate_limit_are_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let mut bot = json_request(Method::POST, "/api/s3/upload", descriptor());
        bot.headers_mut()
            .insert(header::USER_AGENT, "python-requests/2.32".parse().unwrap());
        let response = app.clone().oneshot(bot).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["data"]["message"], crate::guard::BOT_MESSAGE);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(json_request(Method::POST, "/api/s3/upload", descriptor()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(json_request(Method::POST, "/api/s3/upload", descriptor()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = body_json(response).await;
        assert_eq!(body["data"]["message"], crate::guard::RATE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_signed_put_then_delete_twice() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let app = create_router(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/api/s3/upload", descriptor()))
            .await
            .unwrap();
        let body = body_json(response).await;
        let key = body["data"]["storageKey"].as_str().unwrap().to_string();
        let url = body["data"]["uploadUrl"].as_str().unwrap().to_string();
        let path = url.strip_prefix(&state.config.node.public_base_url).unwrap();

        let put = Request::builder()
            .method(Method::PUT)
            .uri(path)
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from("hello world"))
            .unwrap();
        let response = app.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.object_store.exists(&key).await.unwrap());

        let get = Request::builder()
            .uri(format!("/_local/objects/{key}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        for expected in ["deleted", "not_found"] {
            let response = app
                .clone()
                .oneshot(json_request(
                    Method::DELETE,
                    "/api/s3/delete",
                    json!({ "key": key }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["data"]["outcome"], expected);
        }
    }

    #[tokio::test]
    async fn test_signed_put_rejects_substituted_payload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let app = create_router(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/api/s3/upload", descriptor()))
            .await
            .unwrap();
        let body = body_json(response).await;
        let url = body["data"]["uploadUrl"].as_str().unwrap().to_string();
        let path = url.strip_prefix(&state.config.node.public_base_url).unwrap();

        let wrong_type = Request::builder()
            .method(Method::PUT)
            .uri(path)
            .header(header::CONTENT_TYPE, "text/html")
            .body(Body::from("hello world"))
            .unwrap();
        let response = app.clone().oneshot(wrong_type).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let wrong_length = Request::builder()
            .method(Method::PUT)
            .uri(path)
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from("hello"))
            .unwrap();
        let response = app.clone().oneshot(wrong_length).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let tampered = path.replace("contentLength=11", "contentLength=5");
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri(tampered)
                    .header(header::CONTENT_TYPE, "image/png")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_validate_course_form() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/courses/validate",
                json!({
                    "title": "Intro to Photography",
                    "description": "Light, lenses and composition.",
                    "smallDescription": "Take better photos.",
                    "fileKey": "abc-cover.png",
                    "duration": 4,
                    "price": 20,
                    "level": "Beginner",
                    "category": "Photography",
                    "slug": "",
                    "status": "Published"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["slug"], "intro-to-photography");
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let request = Request::builder()
            .uri("/_internal/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["storage_backend"], "local");
    }
}
