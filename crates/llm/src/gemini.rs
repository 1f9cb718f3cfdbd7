//! REST client for Gemini-style `generateContent` endpoints.
//!
//! Sends `POST {api_url}/models/{model}:generateContent` with the chunk
//! instructions as a single user turn and returns the concatenated text
//! parts of the first candidate.

use async_trait::async_trait;
use serde::Deserialize;

use crate::credential::ApiCredential;
use crate::error::ModelError;
use crate::provider::{ChunkRequest, PromptModel};

/// Default public endpoint.
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default text model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Sampling temperature; prompt sets need variety.
const TEMPERATURE: f64 = 1.0;

/// HTTP client for a single model on a `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    credential: ApiCredential,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate, if any.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}

impl GeminiClient {
    /// Create a client for `model` at `api_url`, e.g. [`DEFAULT_API_URL`].
    pub fn new(api_url: String, model: String, credential: ApiCredential) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, model, credential)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: String,
        model: String,
        credential: ApiCredential,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            credential,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full URL of the `generateContent` method for this model.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }

    /// Request body for one chunk.
    pub fn request_body(request: &ChunkRequest) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.instructions }],
            }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "responseMimeType": "application/json",
            },
        })
    }

    /// Send one `generateContent` call and return the raw response.
    pub async fn generate_content(
        &self,
        request: &ChunkRequest,
    ) -> Result<GenerateResponse, ModelError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.credential.expose())
            .json(&Self::request_body(request))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ModelError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ModelError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ModelError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PromptModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChunkRequest) -> Result<String, ModelError> {
        let response = self.generate_content(request).await?;
        match response.text() {
            Some(text) => {
                tracing::debug!(
                    chunk = request.chunk,
                    count = request.count,
                    bytes = text.len(),
                    finish_reason = response.finish_reason().unwrap_or("unknown"),
                    "Model chunk received",
                );
                Ok(text)
            }
            None => {
                tracing::warn!(
                    chunk = request.chunk,
                    finish_reason = response.finish_reason().unwrap_or("unknown"),
                    "Model returned no candidate text",
                );
                Err(ModelError::EmptyResponse)
            }
        }
    }
}
