// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request/response/error events for generation calls
//!
//! Sinks are fire-and-forget: they never fail and never block the caller.

pub mod user_id;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::TelemetryConfig;
use crate::llm::content::UsageMetadata;

pub use user_id::{persistent_user_id, persistent_user_id_at};

/// A generation request is about to be sent
#[derive(Debug, Clone, Serialize)]
pub struct ApiRequestEvent {
    pub model: String,
    pub request_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ApiRequestEvent {
    pub fn new(model: impl Into<String>, request_text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            request_text: request_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A generation request completed
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponseEvent {
    pub model: String,
    pub duration_ms: u64,
    pub usage: Option<UsageMetadata>,
    pub response_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ApiResponseEvent {
    pub fn new(
        model: impl Into<String>,
        duration_ms: u64,
        usage: Option<UsageMetadata>,
        response_text: Option<String>,
    ) -> Self {
        Self {
            model: model.into(),
            duration_ms,
            usage,
            response_text,
            timestamp: Utc::now(),
        }
    }
}

/// A generation request failed
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorEvent {
    pub model: String,
    pub error_message: String,
    pub error_type: String,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ApiErrorEvent {
    pub fn from_error(
        model: impl Into<String>,
        error: &crate::error::HeadroomError,
        duration_ms: u64,
    ) -> Self {
        Self {
            model: model.into(),
            error_message: error.to_string(),
            error_type: error.error_category().to_string(),
            status_code: error.status_code(),
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for generation events
pub trait TelemetrySink: Send + Sync {
    fn api_request(&self, event: &ApiRequestEvent);
    fn api_response(&self, event: &ApiResponseEvent);
    fn api_error(&self, event: &ApiErrorEvent);
}

/// Emits events as `tracing` events on the `headroom.telemetry` target.
pub struct LogTelemetry {
    session_id: Uuid,
    user_id: String,
    enabled: bool,
    log_prompts: bool,
}

impl LogTelemetry {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            enabled: true,
            log_prompts: false,
        }
    }

    /// Sink with a throwaway user id (nothing is written to disk)
    pub fn ephemeral() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn from_config(config: &TelemetryConfig, user_id: impl Into<String>) -> Self {
        Self::new(user_id)
            .with_enabled(config.enabled)
            .with_log_prompts(config.log_prompts)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Include request text in request events
    pub fn with_log_prompts(mut self, log_prompts: bool) -> Self {
        self.log_prompts = log_prompts;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl TelemetrySink for LogTelemetry {
    fn api_request(&self, event: &ApiRequestEvent) {
        if !self.enabled {
            return;
        }
        let prompt = self.log_prompts.then_some(event.request_text.as_str());
        tracing::info!(
            target: "headroom.telemetry",
            event = "api_request",
            session_id = %self.session_id,
            user_id = %self.user_id,
            timestamp = %event.timestamp.to_rfc3339(),
            model = %event.model,
            request_chars = event.request_text.chars().count(),
            request_text = prompt,
        );
    }

    fn api_response(&self, event: &ApiResponseEvent) {
        if !self.enabled {
            return;
        }
        let usage = event.usage.clone().unwrap_or_default();
        tracing::info!(
            target: "headroom.telemetry",
            event = "api_response",
            session_id = %self.session_id,
            user_id = %self.user_id,
            timestamp = %event.timestamp.to_rfc3339(),
            model = %event.model,
            duration_ms = event.duration_ms,
            input_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            thoughts_tokens = usage.thoughts_token_count,
            cached_tokens = usage.cached_content_token_count,
            total_tokens = usage.total_token_count,
            response_chars = event.response_text.as_ref().map(|t| t.chars().count()),
        );
    }

    fn api_error(&self, event: &ApiErrorEvent) {
        if !self.enabled {
            return;
        }
        tracing::warn!(
            target: "headroom.telemetry",
            event = "api_error",
            session_id = %self.session_id,
            user_id = %self.user_id,
            timestamp = %event.timestamp.to_rfc3339(),
            model = %event.model,
            duration_ms = event.duration_ms,
            error_type = %event.error_type,
            status_code = event.status_code,
            error = %event.error_message,
        );
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn api_request(&self, _event: &ApiRequestEvent) {}
    fn api_response(&self, _event: &ApiResponseEvent) {}
    fn api_error(&self, _event: &ApiErrorEvent) {}
}
