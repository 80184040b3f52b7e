// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry logic for generation calls with exponential backoff

use crate::config::settings::ResilienceConfig;
use crate::error::{ApiError, HeadroomError, Result};
use crate::llm::factory::AuthType;
use rand::Rng;
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration with smart defaults
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay in milliseconds (exponentially increased)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = exponential_ms.min(self.max_delay_ms);

        let jitter_range = (capped_ms as f64 * self.jitter) as i64;
        let jitter_ms = if jitter_range > 0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        let final_ms = (capped_ms as i64 + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms)
    }

    /// Delay before the next attempt; a server-supplied retry-after wins
    /// when it is longer, but never beyond `max_delay_ms`.
    fn delay_for(&self, attempt: u32, error: &HeadroomError) -> Duration {
        let backoff = self.calculate_delay(attempt);
        match error {
            HeadroomError::Api(ApiError::RateLimited(secs)) if *secs > 0 => {
                let requested = Duration::from_secs(u64::from(*secs))
                    .min(Duration::from_millis(self.max_delay_ms));
                backoff.max(requested)
            }
            _ => backoff,
        }
    }
}

/// Predicate deciding whether a failed attempt is retried
pub type RetryPredicate = fn(&HeadroomError) -> bool;

/// Options for [`with_retry`]
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub config: RetryConfig,
    pub should_retry: RetryPredicate,
    /// Used to tailor rate-limit log messages
    pub auth_type: Option<AuthType>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
            should_retry: is_transient_error,
            auth_type: None,
        }
    }
}

impl RetryOptions {
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_auth_type(mut self, auth_type: Option<AuthType>) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn with_predicate(mut self, should_retry: RetryPredicate) -> Self {
        self.should_retry = should_retry;
        self
    }
}

fn server_fault_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b5\d{2}\b").ok())
        .as_ref()
}

/// Rate limits (429) and server faults (5xx) are transient.
///
/// A known status code is authoritative. Otherwise the message text is
/// checked for a 429 or a 5xx code.
pub fn is_transient_error(error: &HeadroomError) -> bool {
    if let Some(status) = error.status_code() {
        return status == 429 || (500..600).contains(&status);
    }
    if matches!(error, HeadroomError::InvalidHistory(_)) {
        return false;
    }

    let message = error.to_string();
    if message.contains("429") {
        return true;
    }
    server_fault_pattern().is_some_and(|re| re.is_match(&message))
}

/// Retry an async operation with exponential backoff
///
/// # Arguments
/// * `operation` - The async operation to retry
/// * `options` - Backoff config, retry predicate, and auth type for logging
/// * `operation_name` - Name of the operation for logging
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    options: RetryOptions,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let config = &options.config;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        target: "headroom.llm.retry",
                        operation = operation_name,
                        attempts = attempt + 1,
                        "succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !(options.should_retry)(&error) {
                    tracing::debug!(
                        target: "headroom.llm.retry",
                        operation = operation_name,
                        error = %error,
                        "non-retryable error"
                    );
                    return Err(error);
                }

                if attempt >= config.max_retries {
                    tracing::warn!(
                        target: "headroom.llm.retry",
                        operation = operation_name,
                        retries = config.max_retries,
                        error = %error,
                        "exhausted all retries"
                    );
                    return Err(error);
                }

                if error.status_code() == Some(429) {
                    if let Some(auth_type) = options.auth_type {
                        tracing::warn!(
                            target: "headroom.llm.retry",
                            operation = operation_name,
                            auth_type = %auth_type,
                            "{}",
                            auth_type.rate_limit_message().trim()
                        );
                    }
                }

                let delay = config.delay_for(attempt, &error);
                tracing::warn!(
                    target: "headroom.llm.retry",
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_secs = delay.as_secs_f64(),
                    error = %error,
                    "attempt failed, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
