use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::gemini::GenerationClient;
use crate::rate_limit::FixedWindowLimiter;

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<FixedWindowLimiter>,
    pub generator: Arc<GenerationClient>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/restaurants",
            post(handlers::restaurants_handler).fallback(handlers::method_not_allowed),
        )
        .route("/health", get(handlers::health_handler))
        .layer(middleware::from_fn(apply_cors))
        .with_state(state)
}

const ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5000",
    "http://localhost:5173",
];

const ALLOWED_ORIGIN_SUFFIXES: &[&str] = &[".web.app", ".firebaseapp.com"];

/// Exact match against the literal allow-list, or a domain-suffix match for
/// the hosting platforms' preview/production domains.
pub fn origin_allowed(origin: &str) -> bool {
    ALLOWED_ORIGINS.contains(&origin)
        || ALLOWED_ORIGIN_SUFFIXES
            .iter()
            .any(|suffix| origin.ends_with(suffix))
}

/// CORS is handled manually: allowed origins are echoed back, disallowed
/// origins get no allow-origin header, and every OPTIONS request is answered
/// with an empty 204 before reaching the router. The health endpoint is open
/// to any origin.
async fn apply_cors(request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let any_origin = request.uri().path() == "/health";

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        set_cors_headers(response.headers_mut(), origin.as_deref(), any_origin);
        return response;
    }

    let mut response = next.run(request).await;
    set_cors_headers(response.headers_mut(), origin.as_deref(), any_origin);
    response
}

fn set_cors_headers(headers: &mut HeaderMap, origin: Option<&str>, any_origin: bool) {
    if any_origin {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    } else if let Some(origin) = origin.filter(|o| origin_allowed(o)) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("3600"),
    );
}

#[test]
fn test_origin_allow_list() {
    assert!(origin_allowed("http://localhost:3000"));
    assert!(origin_allowed("https://noupick-staging.web.app"));
    assert!(origin_allowed("https://anything.firebaseapp.com"));
    assert!(!origin_allowed("https://evil.example.com"));
    assert!(!origin_allowed("http://localhost:9999"));
}
