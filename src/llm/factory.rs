// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Content generator factory
//!
//! Resolves the effective backend configuration from settings and
//! environment, then builds the matching generator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{HeadroomError, Result};
use crate::llm::provider::{ContentGenerator, DEFAULT_LOCAL_MODEL};
use crate::llm::providers::{GeminiGenerator, OllamaGenerator};

/// How the session reaches its model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    /// Gemini API with an API key
    GeminiApiKey,
    /// Vertex AI express mode
    VertexAi,
    /// Local Ollama server
    #[default]
    Ollama,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::GeminiApiKey => "gemini-api-key",
            AuthType::VertexAi => "vertex-ai",
            AuthType::Ollama => "ollama",
        }
    }

    /// All supported auth types
    pub fn all() -> &'static [AuthType] {
        &[AuthType::GeminiApiKey, AuthType::VertexAi, AuthType::Ollama]
    }

    /// Hint shown to the user when this backend reports a rate limit
    pub fn rate_limit_message(&self) -> &'static str {
        match self {
            AuthType::GeminiApiKey | AuthType::VertexAi => {
                "\nThe AI service has indicated a rate limit. Please wait and try again. If using a Google Cloud service, check your quotas. For personal Google accounts, usage limits apply."
            }
            AuthType::Ollama => {
                "\nThe local Ollama service returned a rate limit error (e.g., 429). This might be due to a proxy or if the Ollama server itself has concurrent request limits. Please check your Ollama server logs and configuration."
            }
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AuthType::all()
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown auth type '{}', expected one of: gemini-api-key, vertex-ai, ollama",
                    s
                )
            })
    }
}

/// Resolved backend configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ContentGeneratorConfig {
    pub model: String,
    pub auth_type: AuthType,
    pub api_key: Option<String>,
    /// Vertex AI project
    pub project: Option<String>,
    /// Vertex AI location
    pub location: Option<String>,
    /// Endpoint override
    pub base_url: Option<String>,
}

/// Resolve the backend configuration.
///
/// Effective model: explicit argument, then settings, then
/// [`DEFAULT_LOCAL_MODEL`]. Credentials are only attached when the selected
/// auth type has everything it needs.
pub fn create_content_generator_config(
    model: Option<&str>,
    auth_type: AuthType,
    settings: &Settings,
) -> ContentGeneratorConfig {
    let effective_model = model
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .or_else(|| Some(settings.defaults.model.clone()).filter(|m| !m.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());

    let mut config = ContentGeneratorConfig {
        model: effective_model,
        auth_type,
        api_key: None,
        project: None,
        location: None,
        base_url: None,
    };

    match auth_type {
        AuthType::GeminiApiKey => {
            config.api_key = settings.get_gemini_api_key();
            config.base_url = settings.providers.gemini.base_url.clone();
        }
        AuthType::VertexAi => {
            let key = settings.get_vertex_api_key();
            let project = settings.get_vertex_project();
            let location = settings.get_vertex_location();
            if key.is_some() && project.is_some() && location.is_some() {
                config.api_key = key;
                config.project = project;
                config.location = location;
            }
            config.base_url = settings.providers.vertex.base_url.clone();
        }
        AuthType::Ollama => {
            config.base_url = Some(settings.get_ollama_base_url());
        }
    }

    tracing::debug!(
        target: "headroom.llm.factory",
        model = %config.model,
        auth_type = %config.auth_type,
        has_api_key = config.api_key.is_some(),
        "resolved content generator config"
    );

    config
}

/// Build the generator for a resolved configuration.
pub fn create_content_generator(
    config: &ContentGeneratorConfig,
) -> Result<Arc<dyn ContentGenerator>> {
    match config.auth_type {
        AuthType::GeminiApiKey => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                HeadroomError::Config(
                    "No Gemini API key found. Set GEMINI_API_KEY env var or add it to settings.json."
                        .to_string(),
                )
            })?;
            let generator = match &config.base_url {
                Some(url) => GeminiGenerator::with_base_url(api_key, url),
                None => GeminiGenerator::new(api_key),
            };
            Ok(Arc::new(generator))
        }
        AuthType::VertexAi => {
            let (Some(api_key), Some(project), Some(location)) = (
                config.api_key.clone(),
                config.project.as_deref(),
                config.location.as_deref(),
            ) else {
                return Err(HeadroomError::Config(
                    "Vertex AI requires GOOGLE_API_KEY, GOOGLE_CLOUD_PROJECT and GOOGLE_CLOUD_LOCATION."
                        .to_string(),
                ));
            };
            let generator = match &config.base_url {
                Some(url) => GeminiGenerator::with_base_url(api_key, url),
                None => GeminiGenerator::vertex(api_key, project, location),
            };
            Ok(Arc::new(generator))
        }
        AuthType::Ollama => {
            let generator = match &config.base_url {
                Some(url) => OllamaGenerator::with_base_url(url),
                None => OllamaGenerator::new(),
            };
            Ok(Arc::new(generator))
        }
    }
}
