//! Pretty-printed JSON responses outside release mode.

use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::{Request, State},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    middleware::Next,
    response::Response,
};

use tracing::warn;

use crate::AppState;

/// Largest body that gets reformatted.
const MAX_PRETTY_BYTES: usize = 1 << 20;

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Axum middleware: re-indent JSON bodies unless `config.release` is set.
pub async fn pretty_json(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if state.config.release || !is_json(&response) {
        return response;
    }

    // Bodies without a known bound, or above it, pass through untouched.
    let bounded = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|n| n <= MAX_PRETTY_BYTES as u64);
    if !bounded {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_PRETTY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer JSON response");
            return Response::from_parts(parts, Body::empty());
        }
    };
    let pretty = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| serde_json::to_vec_pretty(&v).ok());
    match pretty {
        Some(pretty) => {
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(pretty))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Bytes;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use runa_core::auth::password::Hasher;
    use runa_core::store::MemoryStore;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ApiConfig;

    fn app(payload: String) -> Router {
        let state = AppState::with_hasher(
            Arc::new(MemoryStore::new()),
            ApiConfig::default(),
            Hasher::with_params(1024, 1, 1).unwrap(),
        );
        Router::new()
            .route(
                "/",
                get(move || {
                    let payload = payload.clone();
                    async move { axum::Json(serde_json::json!({ "data": payload })) }
                }),
            )
            .layer(from_fn_with_state(state, pretty_json))
    }

    async fn fetch(payload: String) -> (Response, Bytes) {
        let response = app(payload)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        (Response::from_parts(parts, Body::empty()), bytes)
    }

    #[tokio::test]
    async fn small_json_is_indented() {
        let (_, bytes) = fetch("x".into()).await;
        assert_eq!(bytes.as_ref(), b"{\n  \"data\": \"x\"\n}");
    }

    #[tokio::test]
    async fn oversized_json_passes_through_unchanged() {
        let payload = "x".repeat(MAX_PRETTY_BYTES + 1);
        let (response, bytes) = fetch(payload.clone()).await;
        assert!(response.status().is_success());
        let expected = serde_json::to_vec(&serde_json::json!({ "data": payload })).unwrap();
        assert_eq!(bytes.len(), expected.len());
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }
}
