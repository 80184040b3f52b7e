// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation content types
//!
//! Turns (`Content`), their payload units (`Part`), and the response envelope
//! returned by generation backends. The serde representation follows the
//! Gemini JSON shape so history can be sent to the cloud API verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// User-authored turn (including function responses)
    User,
    /// Model-authored turn
    Model,
    /// Anything else; rejected by history validation
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::Other(other) => other,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "model" => Role::Model,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The result of a function call, sent back by the user side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub response: serde_json::Value,
}

/// Inline binary payload (base64)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// One payload unit within a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePart", into = "WirePart")]
pub enum Part {
    /// Visible text (may be empty, which makes the part invalid)
    Text(String),
    /// Internal reasoning, never treated as visible output
    Thought(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
    InlineData(Blob),
    /// Provider-specific payload (`executableCode`, `fileData`, ...), kept as-is
    Other(Map<String, Value>),
    /// A part with no field set
    Empty,
}

/// Flat wire shape of a part: at most one payload field is meaningful.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl From<WirePart> for Part {
    fn from(wire: WirePart) -> Self {
        if wire.thought == Some(true) {
            return Part::Thought(wire.text.unwrap_or_default());
        }
        if let Some(text) = wire.text {
            return Part::Text(text);
        }
        if let Some(call) = wire.function_call {
            return Part::FunctionCall(call);
        }
        if let Some(response) = wire.function_response {
            return Part::FunctionResponse(response);
        }
        if let Some(blob) = wire.inline_data {
            return Part::InlineData(blob);
        }
        if !wire.other.is_empty() {
            return Part::Other(wire.other);
        }
        Part::Empty
    }
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => WirePart {
                text: Some(text),
                ..Default::default()
            },
            Part::Thought(text) => WirePart {
                text: Some(text),
                thought: Some(true),
                ..Default::default()
            },
            Part::FunctionCall(call) => WirePart {
                function_call: Some(call),
                ..Default::default()
            },
            Part::FunctionResponse(response) => WirePart {
                function_response: Some(response),
                ..Default::default()
            },
            Part::InlineData(blob) => WirePart {
                inline_data: Some(blob),
                ..Default::default()
            },
            Part::Other(other) => WirePart {
                other,
                ..Default::default()
            },
            Part::Empty => WirePart::default(),
        }
    }
}

impl Part {
    /// Text of a visible text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, Part::Thought(_))
    }
}

impl From<&str> for Part {
    fn from(text: &str) -> Self {
        Part::Text(text.to_string())
    }
}

impl From<String> for Part {
    fn from(text: String) -> Self {
        Part::Text(text)
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Author; providers occasionally omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Create a user turn from parts
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some(Role::User),
            parts,
        }
    }

    /// Create a user turn holding a single text part
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::Text(text.into())])
    }

    /// Create a model turn from parts
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some(Role::Model),
            parts,
        }
    }

    /// Create a model turn holding a single text part
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Part::Text(text.into())])
    }

    pub fn is_user(&self) -> bool {
        self.role == Some(Role::User)
    }

    pub fn is_model(&self) -> bool {
        self.role == Some(Role::Model)
    }

    /// A model turn whose first part is non-empty visible text.
    ///
    /// Adjacent turns of this shape are merged when streamed output is recorded.
    pub fn is_text_content(&self) -> bool {
        self.is_model()
            && self
                .parts
                .first()
                .and_then(Part::as_text)
                .is_some_and(|text| !text.is_empty())
    }

    /// A model turn whose first part is a thought.
    pub fn is_thought_content(&self) -> bool {
        self.is_model() && self.parts.first().is_some_and(Part::is_thought)
    }

    /// A user turn consisting solely of function responses.
    pub fn is_function_response(&self) -> bool {
        self.is_user()
            && !self.parts.is_empty()
            && self
                .parts
                .iter()
                .all(|p| matches!(p, Part::FunctionResponse(_)))
    }

    /// Concatenated visible text (thoughts excluded)
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

/// Token accounting attached to a response or stream chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u32>,
}

/// One candidate answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// A full response, or a single chunk of a streamed response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// Full request history including any backend-driven tool-call exchanges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic_function_calling_history: Option<Vec<Content>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// Wrap a single turn as the first candidate
    pub fn from_content(content: Content) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(content),
                finish_reason: None,
                index: Some(0),
            }],
            ..Default::default()
        }
    }

    /// Set usage metadata
    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage_metadata = Some(usage);
        self
    }

    /// Content of the first candidate
    pub fn first_content(&self) -> Option<&Content> {
        self.candidates.first().and_then(|c| c.content.as_ref())
    }

    /// Visible text of the first candidate
    pub fn text(&self) -> Option<String> {
        let text = self.first_content()?.text();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Function calls of the first candidate
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.first_content()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::FunctionCall(call) => Some(call),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Render visible text plus any function calls, as reported in response events.
pub fn structured_response_text(parts: &[Part]) -> Option<String> {
    let text: String = parts.iter().filter_map(Part::as_text).collect();
    let calls: Vec<&FunctionCall> = parts
        .iter()
        .filter_map(|p| match p {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        })
        .collect();

    let calls_json = if calls.is_empty() {
        None
    } else {
        serde_json::to_string_pretty(&calls).ok()
    };

    match (text.is_empty(), calls_json) {
        (false, Some(json)) => Some(format!("{}\n{}", text, json)),
        (false, None) => Some(text),
        (true, Some(json)) => Some(json),
        (true, None) => None,
    }
}

/// Structured text of the first candidate of a response
pub fn structured_response(response: &GenerateContentResponse) -> Option<String> {
    response
        .first_content()
        .and_then(|content| structured_response_text(&content.parts))
}
