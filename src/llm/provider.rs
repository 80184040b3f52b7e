// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Content generator trait and request types
//!
//! Defines the abstraction layer for different generation backends.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::content::{Content, GenerateContentResponse};

/// Model used when neither the caller nor settings name one
pub const DEFAULT_LOCAL_MODEL: &str = "ollama/mistral";

/// Embedding model used when none is configured
pub const DEFAULT_LOCAL_EMBEDDING_MODEL: &str = "ollama/nomic-embed-text";

/// Stream of response chunks produced by a backend
pub type ResponseChunkStream =
    Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Main trait for generation backends
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Backend name (e.g., "gemini", "ollama")
    fn name(&self) -> &str;

    /// Buffered generation
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Streaming generation. Errors opening the stream are returned here;
    /// errors after the first chunk arrive as stream items.
    async fn generate_content_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ResponseChunkStream>;

    /// Count tokens for the given contents
    async fn count_tokens(&self, request: CountTokensRequest) -> Result<CountTokensResponse>;

    /// Embed one or more texts
    async fn embed_content(&self, request: EmbedContentRequest) -> Result<EmbedContentResponse>;
}

/// Sampling and prompt configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// System prompt (project context is injected here)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl GenerationConfig {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Field-by-field merge: values set in `overrides` win.
    pub fn merged_with(&self, overrides: Option<&GenerationConfig>) -> GenerationConfig {
        let Some(overrides) = overrides else {
            return self.clone();
        };
        GenerationConfig {
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            max_output_tokens: overrides.max_output_tokens.or(self.max_output_tokens),
            system_instruction: overrides
                .system_instruction
                .clone()
                .or_else(|| self.system_instruction.clone()),
        }
    }
}

/// Request for generation
#[derive(Debug, Clone)]
pub struct GenerateContentRequest {
    /// Model to use
    pub model: String,

    /// Context window: curated history plus the new user turn
    pub contents: Vec<Content>,

    /// Effective generation config
    pub config: GenerationConfig,
}

impl GenerateContentRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            contents,
            config: GenerationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Visible text of every turn, one turn per line
    pub fn flattened_text(&self) -> String {
        self.contents
            .iter()
            .map(Content::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Request for token counting
#[derive(Debug, Clone)]
pub struct CountTokensRequest {
    pub model: String,
    pub contents: Vec<Content>,
}

/// Token count result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    #[serde(default)]
    pub total_tokens: u32,
}

/// Request for embeddings
#[derive(Debug, Clone)]
pub struct EmbedContentRequest {
    pub model: String,
    pub texts: Vec<String>,
}

/// Embedding vectors, one per input text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedContentResponse {
    pub embeddings: Vec<Vec<f32>>,
}
