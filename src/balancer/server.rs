//! Router assembly: a single fallback handler that accepts any method and
//! path, mirroring the upstream's one catch-all `http.HandlerFunc`.

use std::sync::Arc;

use axum::Router;

use super::config::BalancerConfig;
use super::forward::forward;
use super::pool::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool>,
    pub client: reqwest::Client,
    pub config: Arc<BalancerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(forward).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state_with(backends: &[&str]) -> AppState {
        let config = BalancerConfig::default().with_backends(
            backends.iter().map(|s| s.to_string()).collect(),
        );
        AppState {
            pool: Arc::new(Pool::new(backends.iter().map(|s| s.to_string()))),
            client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn returns_503_when_no_backend_is_healthy() {
        let state = state_with(&["server1:8080"]);
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn accepts_any_method_and_path() {
        let state = state_with(&["server1:8080"]);
        let app = build_router(state);

        for method in ["GET", "POST", "DELETE"] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/blobs/some-key")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            // No healthy backend is registered, so every route still
            // resolves to the fallback and returns 503 rather than 404.
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
