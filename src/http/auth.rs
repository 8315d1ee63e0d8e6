//! Shared-secret header check. Deliberately thin: a single header
//! comparison rather than a user/role model, implemented as an axum
//! `from_fn` layer.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::governor::Governor;

/// Rejects the request with 401 when `config.api_key` is set and the
/// configured header is missing or doesn't match. A no-op when no API key is
/// configured.
pub async fn require_api_key(
    State(governor): State<Arc<Governor>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let config = governor.config();
    let Some(expected) = &config.api_key else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(config.api_key_header.as_str())
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(value) if value == expected => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn router_with(governor: Arc<Governor>) -> Router {
        Router::new()
            .route("/protected", get(ok_handler))
            .route_layer(axum::middleware::from_fn_with_state(governor.clone(), require_api_key))
            .with_state(governor)
    }

    #[tokio::test]
    async fn request_without_key_is_allowed_when_none_configured() {
        let config = Config::for_tests();
        let (governor, _rx) = Governor::new(config).unwrap();
        let app = router_with(governor);
        let resp = app
            .oneshot(HttpRequest::builder().uri("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn request_with_missing_key_is_rejected_when_configured() {
        let mut config = Config::for_tests();
        config.api_key = Some("secret".to_string());
        let (governor, _rx) = Governor::new(config).unwrap();
        let app = router_with(governor);
        let resp = app
            .oneshot(HttpRequest::builder().uri("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn request_with_correct_key_is_allowed() {
        let mut config = Config::for_tests();
        config.api_key = Some("secret".to_string());
        let (governor, _rx) = Governor::new(config).unwrap();
        let app = router_with(governor);
        let resp = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header("X-API-Key", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
