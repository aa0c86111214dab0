//! HTTP surface: `POST /run` and `GET /health`

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::RunError;
use crate::pipeline::{Pipeline, RunResponse};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Execute the request body as a script.
///
/// The run is driven on its own task so a client hanging up mid-run
/// cannot cut cleanup short.
async fn run_script(
    State(pipeline): State<Arc<Pipeline>>,
    body: Bytes,
) -> Result<Json<RunResponse>, RunError> {
    let response = tokio::spawn(async move { pipeline.run(&body).await }).await??;
    Ok(Json(response))
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/run", post(run_script))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(config: RunnerConfig) -> Router {
        router(Arc::new(Pipeline::new(config)))
    }

    fn sh_config(root: &std::path::Path) -> RunnerConfig {
        RunnerConfig {
            interpreter: "/bin/sh".into(),
            script_file: "main.sh".into(),
            work_root: root.to_path_buf(),
            timeout: Duration::from_secs(1),
            ..RunnerConfig::default()
        }
    }

    async fn post_run(app: Router, body: &'static str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/run")
            .body(Body::from(body))
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app(sh_config(root.path())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_returns_output_and_result() {
        let root = tempfile::tempdir().unwrap();
        let response = post_run(
            app(sh_config(root.path())),
            r#"echo hello; printf '{"a":1}' > "$RESULT_FILE_PATH""#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"output": "hello\n\n", "result": {"a": 1}})
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script_is_still_ok() {
        let root = tempfile::tempdir().unwrap();
        let response = post_run(app(sh_config(root.path())), "echo bad >&2; exit 2").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"output": "\nbad\n", "result": null})
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_ok_with_sentinel() {
        let root = tempfile::tempdir().unwrap();
        let response = post_run(app(sh_config(root.path())), "sleep 10").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["output"], crate::pipeline::TIMEOUT_MESSAGE);
        assert_eq!(body["result"], Value::Null);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_500() {
        let root = tempfile::tempdir().unwrap();
        let mut config = sh_config(root.path());
        config.interpreter = "/definitely/not/an/interpreter".into();

        let response = post_run(app(config), "print('hi')").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "SPAWN_FAILED");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_body_is_accepted() {
        let root = tempfile::tempdir().unwrap();
        // Past axum's 2MB default limit
        let script = format!("# {}\necho big", "x".repeat(3 * 1024 * 1024));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/run")
            .body(Body::from(script))
            .unwrap();
        let response = app(sh_config(root.path())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["output"], "big\n\n");
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let root = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/run")
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app(sh_config(root.path())).oneshot(request).await.unwrap();

        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
