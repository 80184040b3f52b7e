// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::llm::factory::AuthType;

use super::Settings;

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Get the Gemini API key, checking env var first.
    pub fn get_gemini_api_key(&self) -> Option<String> {
        // Priority: env var > config file.
        non_empty_env(&self.providers.gemini.api_key_env)
            .or_else(|| self.providers.gemini.api_key.clone())
    }

    /// Get the Vertex AI API key, checking env var first.
    pub fn get_vertex_api_key(&self) -> Option<String> {
        non_empty_env(&self.providers.vertex.api_key_env)
            .or_else(|| self.providers.vertex.api_key.clone())
    }

    /// Google Cloud project for Vertex AI.
    pub fn get_vertex_project(&self) -> Option<String> {
        non_empty_env("GOOGLE_CLOUD_PROJECT").or_else(|| self.providers.vertex.project.clone())
    }

    /// Google Cloud location for Vertex AI.
    pub fn get_vertex_location(&self) -> Option<String> {
        non_empty_env("GOOGLE_CLOUD_LOCATION").or_else(|| self.providers.vertex.location.clone())
    }

    /// Ollama server URL, checking OLLAMA_HOST first.
    pub fn get_ollama_base_url(&self) -> String {
        non_empty_env("OLLAMA_HOST")
            .map(|host| {
                if host.starts_with("http://") || host.starts_with("https://") {
                    host
                } else {
                    format!("http://{}", host)
                }
            })
            .unwrap_or_else(|| self.providers.ollama.base_url.clone())
    }

    /// Check if the given backend has a usable configuration.
    pub fn is_auth_configured(&self, auth_type: AuthType) -> bool {
        match auth_type {
            AuthType::Ollama => true,
            AuthType::GeminiApiKey => self.get_gemini_api_key().is_some(),
            AuthType::VertexAi => {
                self.get_vertex_api_key().is_some()
                    && self.get_vertex_project().is_some()
                    && self.get_vertex_location().is_some()
            }
        }
    }
}
