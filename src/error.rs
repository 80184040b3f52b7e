// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Headroom
//!
//! This module defines all error types used throughout the application.

use thiserror::Error;

/// Main error type for Headroom operations
#[derive(Error, Debug)]
pub enum HeadroomError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Conversation history is structurally malformed (fatal, never retried)
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited (429): retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for Headroom operations
pub type Result<T> = std::result::Result<T, HeadroomError>;

impl HeadroomError {
    /// HTTP-equivalent status code carried by this error.
    ///
    /// Typed API errors report their status directly. Anything else is checked
    /// for a JSON error object embedded in the message, e.g.
    /// `... {"error": {"code": 429, "message": "..."}}`.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HeadroomError::Api(ApiError::RateLimited(_)) => Some(429),
            HeadroomError::Api(ApiError::ServerError { status, .. }) => Some(*status),
            HeadroomError::Api(ApiError::AuthenticationFailed) => Some(401),
            HeadroomError::Api(ApiError::ModelNotFound(_)) => Some(404),
            HeadroomError::Http(err) => err.status().map(|s| s.as_u16()),
            other => embedded_status_code(&other.to_string()),
        }
    }

    /// Short category name reported with error events.
    pub fn error_category(&self) -> &'static str {
        match self {
            HeadroomError::Api(api) => match api {
                ApiError::AuthenticationFailed => "authentication",
                ApiError::RateLimited(_) => "rate_limit",
                ApiError::ModelNotFound(_) => "model_not_found",
                ApiError::Network(_) => "network",
                ApiError::InvalidResponse(_) => "invalid_response",
                ApiError::ServerError { status, .. } if *status >= 500 => "server_error",
                ApiError::ServerError { .. } => "client_error",
                ApiError::Timeout => "timeout",
                ApiError::StreamError(_) => "stream",
            },
            HeadroomError::InvalidHistory(_) => "structural",
            HeadroomError::Config(_) => "config",
            HeadroomError::Io(_) => "io",
            HeadroomError::Json(_) => "json",
            HeadroomError::InvalidInput(_) => "invalid_input",
            HeadroomError::Http(_) => "http",
        }
    }
}

/// Extract `error.code` from a JSON object embedded in an error message.
pub(crate) fn embedded_status_code(message: &str) -> Option<u16> {
    let start = message.find('{')?;
    let value: serde_json::Value = serde_json::from_str(&message[start..]).ok()?;
    let error = value.get("error").unwrap_or(&value);
    error
        .get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
}
