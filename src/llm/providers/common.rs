// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;

use crate::error::{ApiError, HeadroomError};

/// `Headroom/<version> (<os>; <arch>)`
pub(crate) fn user_agent() -> String {
    format!(
        "Headroom/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// HTTP client shared by the providers.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .user_agent(user_agent())
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "headroom.llm", error = %e, "falling back to default http client");
            Client::new()
        })
}

/// Parse numeric Retry-After header (seconds).
pub(crate) fn parse_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Construct a standardized server error.
pub(crate) fn server_error(status: u16, message: impl Into<String>) -> HeadroomError {
    HeadroomError::Api(ApiError::ServerError {
        status,
        message: message.into(),
    })
}

/// Map a non-success HTTP status to a typed error. The raw body is kept as
/// the message so embedded JSON error objects survive for display.
pub(crate) fn api_error_from_status(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    model: &str,
) -> HeadroomError {
    match status {
        401 | 403 => HeadroomError::Api(ApiError::AuthenticationFailed),
        404 => HeadroomError::Api(ApiError::ModelNotFound(model.to_string())),
        429 => {
            let retry_after = parse_retry_after_seconds(headers).unwrap_or(0);
            HeadroomError::Api(ApiError::RateLimited(
                u32::try_from(retry_after).unwrap_or(u32::MAX),
            ))
        }
        _ => server_error(status, body),
    }
}

/// Splits a streamed body into lines on raw bytes.
///
/// Bytes are held until a full line arrives, so a multi-byte character split
/// across network chunks is decoded intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    /// Whatever trails the last newline once the body has ended.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
