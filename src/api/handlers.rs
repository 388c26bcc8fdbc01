use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use nanoid::nanoid;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::data_models::{SearchRequest, SearchResponse};
use crate::error::AppError;
use crate::gemini::GenerateError;
use crate::parser;
use crate::prompt::{self, PromptParams};
use crate::rate_limit::RateDecision;

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "Method not allowed",
            "message": "Use POST for this endpoint",
        })),
    )
        .into_response()
}

/// `POST /api/restaurants`: admit through the rate limiter, validate, build
/// the prompt, call the model (one retry inside the client), then parse the
/// delimited output into at most three records.
pub async fn restaurants_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Response {
    let client_id = client_identity(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let decision = state.limiter.check(&client_id);
    let limit = state.limiter.max_requests();

    if !decision.allowed {
        info!("rate limit exceeded for {client_id}");
        let retry_after = decision.reset_in_ms.div_ceil(1000);
        return with_rate_headers(
            AppError::RateLimited { retry_after }.into_response(),
            limit,
            &decision,
        );
    }

    // Validation happens before any model call is made.
    let location_query = match request.location_query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => query.to_string(),
        _ => {
            return with_rate_headers(
                AppError::BadRequest("locationQuery is required".to_string()).into_response(),
                limit,
                &decision,
            );
        }
    };

    let prompt_text = prompt::build_prompt(
        &PromptParams {
            location_query: &location_query,
            cuisine: &request.cuisine,
            exclude_names: &request.exclude_names,
            radius: &request.radius,
        },
        &nanoid!(12),
    );

    let output = match state.generator.generate(&prompt_text, request.coords).await {
        Ok(output) => output,
        Err(err) => {
            error!("generation failed after retry: {err:#}");
            let app_err = match err {
                // Relay a provider-supplied message when its status is
                // meaningful; raw 500s stay generic.
                GenerateError::Provider { status, message } if status != 500 => {
                    AppError::Upstream { status, message }
                }
                _ => AppError::Internal,
            };
            return with_rate_headers(app_err.into_response(), limit, &decision);
        }
    };

    let restaurants = if parser::contains_no_matches(&output.text) {
        Vec::new()
    } else {
        parser::parse_response(&output.text, &output.grounding_chunks)
    };

    with_rate_headers(
        Json(SearchResponse {
            restaurants,
            raw_text: output.text,
        })
        .into_response(),
        limit,
        &decision,
    )
}

/// Client identity for rate limiting: first forwarded address, then the
/// real-ip header, then the socket peer.
fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return first.to_string();
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn with_rate_headers(mut response: Response, limit: u32, decision: &RateDecision) -> Response {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_in_ms.div_ceil(1000)),
    );
    response
}

#[test]
fn test_client_identity_prefers_forwarded_header() {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
    headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));

    assert_eq!(client_identity(&headers, None), "10.0.0.1");

    headers.remove("x-forwarded-for");
    assert_eq!(client_identity(&headers, None), "10.0.0.9");

    headers.remove("x-real-ip");
    assert_eq!(client_identity(&headers, None), "unknown");

    let peer: SocketAddr = "192.168.1.7:4242".parse().unwrap();
    assert_eq!(client_identity(&headers, Some(peer)), "192.168.1.7");
}
