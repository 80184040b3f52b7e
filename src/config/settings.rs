// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Headroom
//!
//! Handles loading and saving settings from ~/.headroom/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::factory::AuthType;
use crate::llm::provider::{DEFAULT_LOCAL_EMBEDDING_MODEL, DEFAULT_LOCAL_MODEL};

mod io;
mod merge;
mod validation;

/// Main settings structure, stored in ~/.headroom/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Model backend configurations
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Default settings for new sessions
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Context file discovery settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Request/response event logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Retry settings for generation calls
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl Settings {
    /// Replace the stored defaults with whichever values are given.
    /// Returns whether anything was set.
    pub fn update_defaults(
        &mut self,
        model: Option<&str>,
        auth_type: Option<AuthType>,
        temperature: Option<f32>,
    ) -> bool {
        let mut changed = false;
        if let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) {
            self.defaults.model = model.to_string();
            changed = true;
        }
        if let Some(auth_type) = auth_type {
            self.defaults.auth_type = auth_type;
            changed = true;
        }
        if let Some(temperature) = temperature {
            self.defaults.temperature = Some(temperature);
            changed = true;
        }
        changed
    }
}

/// Configuration for model backends
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// Gemini API (API key auth)
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Vertex AI express mode
    #[serde(default)]
    pub vertex: VertexConfig,

    /// Local Ollama server
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_gemini_api_key_env")]
    pub api_key_env: String,

    /// Base URL for API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Vertex AI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_vertex_api_key_env")]
    pub api_key_env: String,

    /// Google Cloud project (GOOGLE_CLOUD_PROJECT wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Google Cloud location (GOOGLE_CLOUD_LOCATION wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server URL (OLLAMA_HOST wins)
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model used for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

/// Default settings for new sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Backend to use
    #[serde(default)]
    pub auth_type: AuthType,

    /// Model to use (falls back to the local default)
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens for response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Whether to use streaming by default
    #[serde(default = "default_true")]
    pub stream: bool,
}

/// Context file discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Context file name searched for in each directory
    #[serde(default = "default_context_file_name")]
    pub file_name: String,

    /// Extra context files appended after discovery
    #[serde(default)]
    pub extension_files: Vec<PathBuf>,

    /// Upper bound on directories scanned below the working directory
    #[serde(default = "default_max_scan_dirs")]
    pub max_scan_dirs: usize,
}

/// Request/response event logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit api_request/api_response/api_error events
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Include prompt text in request events
    #[serde(default)]
    pub log_prompts: bool,
}

/// Retry configuration for generation calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_gemini_api_key_env(),
            base_url: None,
        }
    }
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_vertex_api_key_env(),
            project: None,
            location: None,
            base_url: None,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::default(),
            model: default_model(),
            temperature: None,
            max_output_tokens: None,
            stream: true,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            file_name: default_context_file_name(),
            extension_files: Vec::new(),
            max_scan_dirs: default_max_scan_dirs(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_prompts: false,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_gemini_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_vertex_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_ollama_base_url() -> String {
    crate::llm::providers::ollama::DEFAULT_OLLAMA_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_LOCAL_EMBEDDING_MODEL.to_string()
}

fn default_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_context_file_name() -> String {
    crate::context::DEFAULT_CONTEXT_FILENAME.to_string()
}

fn default_max_scan_dirs() -> usize {
    200
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    16000
}

fn default_jitter() -> f64 {
    0.25
}
