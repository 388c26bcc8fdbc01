use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt; // for `oneshot`

use noupick::api::{AppState, create_router};
use noupick::data_models::{GeoLocation, GroundingChunk, GroundingSource};
use noupick::gemini::{GenerateBackend, GenerateError, GenerationClient, ModelOutput};
use noupick::rate_limit::FixedWindowLimiter;

mod test_helpers {
    use super::*;

    /// Backend that always succeeds with a fixed output, counting attempts.
    pub struct FixedBackend {
        pub output: ModelOutput,
        pub attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GenerateBackend for FixedBackend {
        async fn attempt(
            &self,
            _prompt: &str,
            _coords: Option<GeoLocation>,
        ) -> Result<ModelOutput, GenerateError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    /// Backend that fails the first `failures` attempts, then succeeds.
    pub struct FlakyBackend {
        pub output: ModelOutput,
        pub failures: usize,
        pub attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GenerateBackend for FlakyBackend {
        async fn attempt(
            &self,
            _prompt: &str,
            _coords: Option<GeoLocation>,
        ) -> Result<ModelOutput, GenerateError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(GenerateError::EmptyResponse);
            }
            Ok(self.output.clone())
        }
    }

    /// Backend that always fails with a provider error.
    pub struct ProviderErrorBackend {
        pub status: u16,
        pub message: &'static str,
        pub attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GenerateBackend for ProviderErrorBackend {
        async fn attempt(
            &self,
            _prompt: &str,
            _coords: Option<GeoLocation>,
        ) -> Result<ModelOutput, GenerateError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(GenerateError::Provider {
                status: self.status,
                message: self.message.to_string(),
            })
        }
    }

    pub fn output(text: &str) -> ModelOutput {
        ModelOutput {
            text: text.to_string(),
            grounding_chunks: Vec::new(),
        }
    }

    pub fn app_with(backend: Arc<dyn GenerateBackend>, limit: u32) -> Router {
        let state = AppState {
            limiter: Arc::new(FixedWindowLimiter::new(limit, Duration::from_secs(60))),
            // Keep the retry delay short so failure paths stay fast.
            generator: Arc::new(GenerationClient::with_retry_delay(
                backend,
                Duration::from_millis(5),
            )),
        };
        create_router(state)
    }

    pub fn post_restaurants(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/restaurants")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_scenario_a_valid_request_yields_one_record() {
    let backend = Arc::new(FixedBackend {
        output: output(
            "Name: Joe's Tacos\nCuisine: Mexican\nRating: 4.5\nStatus: Open\nReason: Great salsa\n---SEPARATOR---",
        ),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend.clone(), 10);

    let response = app
        .oneshot(post_restaurants(
            json!({"locationQuery": "Austin, TX", "cuisine": "Mexican"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-ratelimit-limit").unwrap(),
        "10"
    );
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "9"
    );

    let body = json_body(response).await;
    let restaurants = body["restaurants"].as_array().unwrap();
    assert_eq!(restaurants.len(), 1);
    assert_eq!(restaurants[0]["name"], "Joe's Tacos");
    assert_eq!(restaurants[0]["cuisine"], "Mexican");
    assert_eq!(restaurants[0]["address"], "Nearby");
    assert_eq!(restaurants[0]["rating"], "4.5");
    assert_eq!(restaurants[0]["openStatus"], "Open");
    assert!(restaurants[0]["googleMapLink"].as_str().unwrap().len() > 0);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scenario_b_no_matches_sentinel_returns_empty_list() {
    let backend = Arc::new(FixedBackend {
        output: output("NO_MATCHES_FOUND"),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend, 10);

    let response = app
        .oneshot(post_restaurants(
            json!({"locationQuery": "Austin, TX", "cuisine": "Martian"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["restaurants"].as_array().unwrap().len(), 0);
    assert_eq!(body["rawText"], "NO_MATCHES_FOUND");
}

#[tokio::test]
async fn test_scenario_c_missing_location_query_never_calls_model() {
    let backend = Arc::new(FixedBackend {
        output: output("Name: Should Not Appear"),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend.clone(), 10);

    let response = app
        .oneshot(post_restaurants(json!({"cuisine": "Mexican"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Bad request");
    assert_eq!(body["message"], "locationQuery is required");
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scenario_d_request_over_cap_is_rejected_with_retry_hint() {
    let backend = Arc::new(FixedBackend {
        output: output("Name: Tiny Cafe"),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend, 2);

    for expected_remaining in ["1", "0"] {
        let response = app
            .clone()
            .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-ratelimit-remaining").unwrap(),
            expected_remaining
        );
    }

    let response = app
        .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );

    let body = json_body(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
    assert!(body["retryAfter"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_scenario_e_five_segments_truncate_to_first_three() {
    let raw = (1..=5)
        .map(|i| format!("Name: Spot {i}\nCuisine: Fusion\n"))
        .collect::<Vec<String>>()
        .join("---SEPARATOR---");
    let backend = Arc::new(FixedBackend {
        output: output(&raw),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend, 10);

    let response = app
        .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let names: Vec<&str> = body["restaurants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Spot 1", "Spot 2", "Spot 3"]);
}

#[tokio::test]
async fn test_transient_failure_is_retried_once_and_recovers() {
    let backend = Arc::new(FlakyBackend {
        output: output("Name: Second Chance Diner"),
        failures: 1,
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend.clone(), 10);

    let response = app
        .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["restaurants"][0]["name"], "Second Chance Diner");
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failure_of_both_attempts_surfaces_generic_500() {
    let backend = Arc::new(FlakyBackend {
        output: output("unreachable"),
        failures: 2,
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend.clone(), 10);

    let response = app
        .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "API Error");
    assert_eq!(body["message"], "Internal server error");
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_provider_status_and_message_are_relayed_when_safe() {
    let backend = Arc::new(ProviderErrorBackend {
        status: 503,
        message: "The model is overloaded. Please try again later.",
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend.clone(), 10);

    let response = app
        .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"], "API Error");
    assert_eq!(
        body["message"],
        "The model is overloaded. Please try again later."
    );
    // Both the attempt and its retry hit the provider.
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_grounded_map_links_flow_through_to_records() {
    let backend = Arc::new(FixedBackend {
        output: ModelOutput {
            text: "Name: Joe's Tacos\nAddress: 1 Main St".to_string(),
            grounding_chunks: vec![GroundingChunk {
                web: None,
                maps: Some(GroundingSource {
                    title: Some("Joe's Tacos".to_string()),
                    uri: Some("https://maps.example/joes".to_string()),
                }),
            }],
        },
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend, 10);

    let response = app
        .oneshot(post_restaurants(json!({"locationQuery": "Austin, TX"})))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(
        body["restaurants"][0]["googleMapLink"],
        "https://maps.example/joes"
    );
}

#[tokio::test]
async fn test_health_is_open_and_unlimited() {
    let backend = Arc::new(FixedBackend {
        output: output(""),
        attempts: AtomicUsize::new(0),
    });
    // Cap of zero: every POST would be rejected, health must not be.
    let app = app_with(backend, 0);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].as_str().unwrap().len() > 0);
    assert!(body["version"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn test_options_preflight_returns_204_and_echoes_allowed_origin() {
    let backend = Arc::new(FixedBackend {
        output: output(""),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend, 10);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/restaurants")
                .header(header::ORIGIN, "http://localhost:5173")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:5173"
    );

    // Disallowed origins get the 204 but no allow-origin echo.
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/restaurants")
                .header(header::ORIGIN, "https://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_non_post_method_is_405() {
    let backend = Arc::new(FixedBackend {
        output: output(""),
        attempts: AtomicUsize::new(0),
    });
    let app = app_with(backend, 10);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/restaurants")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Method not allowed");
}
