// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Gemini API / Vertex AI backend
//!
//! The REST responses already use the turn/part shape of
//! [`GenerateContentResponse`], so chunks deserialize directly.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, HeadroomError, Result};
use crate::llm::content::{Content, GenerateContentResponse, Part};
use crate::llm::provider::{
    ContentGenerator, CountTokensRequest, CountTokensResponse, EmbedContentRequest,
    EmbedContentResponse, GenerateContentRequest, GenerationConfig, ResponseChunkStream,
};
use crate::llm::providers::common::{api_error_from_status, http_client, LineBuffer};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const VERTEX_API_URL: &str = "https://aiplatform.googleapis.com/v1";

/// Gemini API / Vertex AI express-mode backend
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiGenerator {
    /// Create a Gemini API generator
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, GEMINI_API_URL)
    }

    /// Create a Vertex AI generator scoped to a project and location
    pub fn vertex(api_key: impl Into<String>, project: &str, location: &str) -> Self {
        Self::with_base_url(
            api_key,
            format!(
                "{}/projects/{}/locations/{}/publishers/google",
                VERTEX_API_URL, project, location
            ),
        )
    }

    /// Create with a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        model: &str,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HeadroomError::Api(ApiError::Timeout)
                } else {
                    HeadroomError::Api(ApiError::Network(e.to_string()))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(api_error_from_status(status, &headers, &text, model));
        }
        Ok(response)
    }
}

fn build_request(request: &GenerateContentRequest) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: &request.contents,
        system_instruction: request
            .config
            .system_instruction
            .as_ref()
            .map(|text| Content {
                role: None,
                parts: vec![Part::Text(text.clone())],
            }),
        generation_config: wire_generation_config(&request.config),
    }
}

fn wire_generation_config(config: &GenerationConfig) -> Option<GeminiGenerationConfig> {
    if config.temperature.is_none() && config.top_p.is_none() && config.max_output_tokens.is_none()
    {
        return None;
    }
    Some(GeminiGenerationConfig {
        temperature: config.temperature,
        top_p: config.top_p,
        max_output_tokens: config.max_output_tokens,
    })
}

/// Parse one SSE line; non-data lines are ignored.
fn parse_sse_line(line: &str) -> Option<Result<GenerateContentResponse>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(data) {
        if value.get("error").is_some() {
            return Some(Err(HeadroomError::Api(ApiError::StreamError(
                data.to_string(),
            ))));
        }
    }
    Some(
        serde_json::from_str::<GenerateContentResponse>(data)
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string()))),
    )
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(&request.model, "generateContent");
        let response = self
            .post(&url, &build_request(&request), &request.model)
            .await?;
        response
            .json()
            .await
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string())))
    }

    async fn generate_content_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ResponseChunkStream> {
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&request.model, "streamGenerateContent")
        );
        let response = self
            .post(&url, &build_request(&request), &request.model)
            .await?;
        let byte_stream = response.bytes_stream();

        let chunk_stream = async_stream::try_stream! {
            let mut lines = LineBuffer::new();

            for await chunk_result in byte_stream {
                let chunk = chunk_result
                    .map_err(|e| HeadroomError::Api(ApiError::StreamError(e.to_string())))?;
                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    if let Some(parsed) = parse_sse_line(&line) {
                        yield parsed?;
                    }
                }
            }

            if let Some(parsed) = lines.finish().as_deref().and_then(parse_sse_line) {
                yield parsed?;
            }
        };

        Ok(Box::pin(chunk_stream))
    }

    async fn count_tokens(&self, request: CountTokensRequest) -> Result<CountTokensResponse> {
        let url = self.endpoint(&request.model, "countTokens");
        let body = serde_json::json!({ "contents": request.contents });
        let response = self.post(&url, &body, &request.model).await?;
        response
            .json()
            .await
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string())))
    }

    async fn embed_content(&self, request: EmbedContentRequest) -> Result<EmbedContentResponse> {
        let model = request
            .model
            .strip_prefix("models/")
            .unwrap_or(&request.model)
            .to_string();

        if let [text] = request.texts.as_slice() {
            let url = self.endpoint(&model, "embedContent");
            let body = EmbedRequest {
                model: format!("models/{}", model),
                content: Content::user_text(text.clone()),
            };
            let response = self.post(&url, &body, &model).await?;
            let single: SingleEmbedResponse = response
                .json()
                .await
                .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string())))?;
            return Ok(EmbedContentResponse {
                embeddings: vec![single.embedding.values],
            });
        }

        let url = self.endpoint(&model, "batchEmbedContents");
        let body = BatchEmbedRequest {
            requests: request
                .texts
                .into_iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", model),
                    content: Content::user_text(text),
                })
                .collect(),
        };
        let response = self.post(&url, &body, &model).await?;
        let batch: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string())))?;
        Ok(EmbedContentResponse {
            embeddings: batch.embeddings.into_iter().map(|e| e.values).collect(),
        })
    }
}

// Gemini REST types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct SingleEmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}
