// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Display formatting for the chat interface
//!
//! Functions return formatted strings rather than writing to stdout, so they
//! can be tested directly.

use serde_json::Value;

use crate::error::{ApiError, HeadroomError};
use crate::llm::content::{Content, Part, UsageMetadata};
use crate::llm::factory::AuthType;

const ERROR_PREFIX: &str = "[AI Service Error: ";

/// Rate-limit hint when the backend is unknown
pub const DEFAULT_RATE_LIMIT_MESSAGE: &str =
    "Your request has been rate limited by the AI service. Please wait and try again later.";

fn rate_limit_message(auth_type: Option<AuthType>) -> &'static str {
    auth_type.map_or(DEFAULT_RATE_LIMIT_MESSAGE, |auth| auth.rate_limit_message())
}

/// Render a generation error for the user.
///
/// Messages carrying a JSON error body (`{"error": {"message", "status",
/// "code"}}`) are unwrapped, including a body whose message is itself such a
/// JSON document. A rate-limit hint for the backend is appended on 429.
pub fn format_api_error(error: &HeadroomError, auth_type: Option<AuthType>) -> String {
    let message = match error {
        HeadroomError::Api(ApiError::ServerError { message, .. }) => message.clone(),
        other => other.to_string(),
    };

    if let Some(text) = format_json_error(&message, auth_type) {
        return text;
    }

    let message = message.trim();
    if message.is_empty() {
        return format!("{}An unknown error occurred.]", ERROR_PREFIX);
    }

    let mut text = format!("{}{}]", ERROR_PREFIX, message);
    if error.status_code() == Some(429) {
        text.push_str(rate_limit_message(auth_type));
    }
    text
}

fn format_json_error(message: &str, auth_type: Option<AuthType>) -> Option<String> {
    let start = message.find('{')?;
    let parsed: Value = serde_json::from_str(&message[start..]).ok()?;
    let body = api_error_body(&parsed)?;

    let mut final_message = body.get("message")?.as_str()?.to_string();
    if let Ok(nested) = serde_json::from_str::<Value>(&final_message) {
        if let Some(inner) = api_error_body(&nested)
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
        {
            final_message = inner.to_string();
        }
    }

    let code = body.get("code").and_then(Value::as_u64);
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| code.map(|c| c.to_string()));

    let mut text = match status {
        Some(status) => format!("{}{} (Status: {})]", ERROR_PREFIX, final_message, status),
        None => format!("{}{}]", ERROR_PREFIX, final_message),
    };
    if code == Some(429) {
        text.push_str(rate_limit_message(auth_type));
    }
    Some(text)
}

fn api_error_body(value: &Value) -> Option<&Value> {
    value
        .get("error")
        .filter(|e| e.is_object() && e.get("message").is_some())
}

/// Truncate a string for display with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Format welcome message
pub fn format_welcome(provider_name: &str, model: &str, context_files: usize) -> String {
    let mut output = String::new();
    output.push_str("Headroom - local-first AI assistant\n");
    output.push_str(&format!("Provider: {} | Model: {}\n", provider_name, model));
    if let Some(summary) = format_context_summary(context_files) {
        output.push_str(&summary);
        output.push('\n');
    }
    output.push_str("\nType /help for commands, or start chatting.\n");
    output
}

/// One-line summary of loaded context files, if any were found
pub fn format_context_summary(file_count: usize) -> Option<String> {
    match file_count {
        0 => None,
        1 => Some("Using 1 HEADROOM.md file".to_string()),
        n => Some(format!("Using {} HEADROOM.md files", n)),
    }
}

/// Token usage footer
pub fn format_usage(usage: &UsageMetadata) -> String {
    let mut fields = Vec::new();
    if let Some(n) = usage.prompt_token_count {
        fields.push(format!("prompt {}", n));
    }
    if let Some(n) = usage.candidates_token_count {
        fields.push(format!("output {}", n));
    }
    if let Some(n) = usage.thoughts_token_count {
        fields.push(format!("thoughts {}", n));
    }
    if let Some(n) = usage.total_token_count {
        fields.push(format!("total {}", n));
    }
    if fields.is_empty() {
        "tokens: unknown".to_string()
    } else {
        format!("tokens: {}", fields.join(", "))
    }
}

/// One line per turn for `/history`
pub fn format_history_entry(index: usize, content: &Content) -> String {
    let role = content
        .role
        .as_ref()
        .map_or("unknown".to_string(), |r| r.to_string());
    let summary = content
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => truncate_string(&text.replace('\n', " "), 60),
            Part::Thought(_) => "(thought)".to_string(),
            Part::FunctionCall(call) => format!("call {}()", call.name),
            Part::FunctionResponse(resp) => format!("result of {}()", resp.name),
            Part::InlineData(blob) => format!("[{}]", blob.mime_type),
            Part::Other(fields) => format!(
                "({})",
                fields.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            Part::Empty => "(empty)".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" | ");

    if summary.is_empty() {
        format!("{:>3}. {}: (no parts)", index + 1, role)
    } else {
        format!("{:>3}. {}: {}", index + 1, role, summary)
    }
}

/// Help text for slash commands
pub fn format_help() -> String {
    [
        "Commands:",
        "  /help     Show this help",
        "  /history  Show the conversation so far",
        "  /clear    Forget the conversation",
        "  /quit     Exit",
    ]
    .join("\n")
}
