use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::data_models::{GeoLocation, GroundingChunk};

const GENERATE_URL_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(500);
const TEMPERATURE: f32 = 1.2;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("request to model provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status. `message` is the
    /// provider's own error message, safe to relay for non-500 statuses.
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("model returned no candidates")]
    EmptyResponse,
}

/// Generated text together with the grounding metadata needed to resolve
/// map links during parsing.
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    pub text: String,
    pub grounding_chunks: Vec<GroundingChunk>,
}

/// One raw call to a text-generation provider. The production impl is
/// [`GeminiBackend`]; tests substitute fakes to drive the retry path.
#[async_trait]
pub trait GenerateBackend: Send + Sync {
    async fn attempt(
        &self,
        prompt: &str,
        coords: Option<GeoLocation>,
    ) -> Result<ModelOutput, GenerateError>;
}

/// Credential strategy for the two deployment targets: a direct API key, or
/// an ADC-minted access token sent as a bearer header.
#[derive(Clone)]
pub enum Auth {
    ApiKey(String),
    Bearer(String),
}

pub struct GeminiBackend {
    client: Client,
    model: String,
    auth: Auth,
}

impl GeminiBackend {
    pub fn new(model: String, auth: Auth) -> GeminiBackend {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        GeminiBackend { client, model, auth }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    tools: Vec<Tool>,
    #[serde(rename = "toolConfig", skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "googleMaps")]
    google_maps: MapsTool,
}

#[derive(Serialize)]
struct MapsTool {}

#[derive(Serialize)]
struct ToolConfig {
    #[serde(rename = "retrievalConfig")]
    retrieval_config: RetrievalConfig,
}

#[derive(Serialize)]
struct RetrievalConfig {
    #[serde(rename = "latLng")]
    lat_lng: LatLng,
}

#[derive(Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[async_trait]
impl GenerateBackend for GeminiBackend {
    async fn attempt(
        &self,
        prompt: &str,
        coords: Option<GeoLocation>,
    ) -> Result<ModelOutput, GenerateError> {
        let url = format!("{GENERATE_URL_BASE}/{}:generateContent", self.model);

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
            tools: vec![Tool {
                google_maps: MapsTool {},
            }],
            tool_config: coords.map(|c| ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: c.lat,
                        longitude: c.lng,
                    },
                },
            }),
        };

        let mut builder = self.client.post(&url).json(&request);
        builder = match &self.auth {
            Auth::ApiKey(key) => builder.query(&[("key", key.as_str())]),
            Auth::Bearer(token) => builder.bearer_auth(token),
        };

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("model provider returned status {status}"));
            return Err(GenerateError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or(GenerateError::EmptyResponse)?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<String>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let grounding_chunks = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default();

        Ok(ModelOutput {
            text,
            grounding_chunks,
        })
    }
}

/// Retry wrapper around a generation backend: one attempt, and on failure
/// exactly one more after a fixed delay. The second failure propagates.
pub struct GenerationClient {
    backend: Arc<dyn GenerateBackend>,
    retry_delay: Duration,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerateBackend>) -> GenerationClient {
        GenerationClient {
            backend,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(
        backend: Arc<dyn GenerateBackend>,
        retry_delay: Duration,
    ) -> GenerationClient {
        GenerationClient {
            backend,
            retry_delay,
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        coords: Option<GeoLocation>,
    ) -> Result<ModelOutput, GenerateError> {
        match self.backend.attempt(prompt, coords).await {
            Ok(output) => Ok(output),
            Err(first) => {
                warn!("generation attempt failed, retrying once: {first}");
                tokio::time::sleep(self.retry_delay).await;
                self.backend.attempt(prompt, coords).await
            }
        }
    }
}
