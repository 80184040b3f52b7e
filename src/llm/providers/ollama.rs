// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Ollama local model backend
//!
//! Implements the ContentGenerator trait over Ollama's `/api/chat` (NDJSON
//! streaming) and `/api/embed` endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, HeadroomError, Result};
use crate::llm::content::{
    Candidate, Content, FunctionCall, GenerateContentResponse, Part, Role, UsageMetadata,
};
use crate::llm::provider::{
    ContentGenerator, CountTokensRequest, CountTokensResponse, EmbedContentRequest,
    EmbedContentResponse, GenerateContentRequest, ResponseChunkStream,
};
use crate::llm::providers::common::{api_error_from_status, http_client, LineBuffer};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const MODEL_PREFIX: &str = "ollama/";
const NOT_RUNNING: &str = "Ollama is not running. Start the Ollama app or run 'ollama serve'";

/// Ollama's tokenizer is not exposed; approximate ~4 characters per token.
const CHARS_PER_TOKEN: f64 = 4.0;

/// Model name as Ollama knows it (`ollama/mistral` -> `mistral`)
pub fn ollama_model_name(model: &str) -> &str {
    model.strip_prefix(MODEL_PREFIX).unwrap_or(model)
}

/// Ollama local model backend
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
}

impl OllamaGenerator {
    /// Create a generator with default base URL (http://localhost:11434)
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    /// Create with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is running and reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(map_send_error(e)),
        }
    }

    fn build_request(&self, request: &GenerateContentRequest, stream: bool) -> OllamaChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.config.system_instruction {
            messages.push(OllamaMessage::text("system", system.clone()));
        }
        for content in &request.contents {
            messages.extend(convert_content(content));
        }

        let config = &request.config;
        let options = if config.temperature.is_none()
            && config.top_p.is_none()
            && config.max_output_tokens.is_none()
        {
            None
        } else {
            Some(OllamaOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_predict: config.max_output_tokens,
            })
        };

        OllamaChatRequest {
            model: ollama_model_name(&request.model).to_string(),
            messages,
            stream,
            options,
        }
    }

    async fn post_chat(&self, body: &OllamaChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &headers, &text, &body.model));
        }
        Ok(response)
    }
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn map_send_error(e: reqwest::Error) -> HeadroomError {
    if e.is_connect() {
        HeadroomError::Api(ApiError::Network(NOT_RUNNING.to_string()))
    } else if e.is_timeout() {
        HeadroomError::Api(ApiError::Timeout)
    } else {
        HeadroomError::Http(e)
    }
}

fn parse_error(
    status: u16,
    headers: &reqwest::header::HeaderMap,
    body: &str,
    model: &str,
) -> HeadroomError {
    if let Ok(error) = serde_json::from_str::<OllamaError>(body) {
        if error.error.contains("model") && error.error.contains("not found") {
            return HeadroomError::Api(ApiError::ModelNotFound(model.to_string()));
        }
    }
    api_error_from_status(status, headers, body, model)
}

/// Convert one turn into Ollama chat messages. Function responses become
/// separate `tool` messages; thoughts are not sent back.
fn convert_content(content: &Content) -> Vec<OllamaMessage> {
    let role = match &content.role {
        Some(Role::Model) => "assistant",
        _ => "user",
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut images = Vec::new();
    let mut tool_messages = Vec::new();

    for part in &content.parts {
        match part {
            Part::Text(t) => text.push_str(t),
            Part::FunctionCall(call) => tool_calls.push(OllamaToolCall {
                function: OllamaFunctionCall {
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                },
            }),
            Part::FunctionResponse(response) => {
                let mut message = OllamaMessage::text("tool", response.response.to_string());
                message.tool_name = Some(response.name.clone());
                tool_messages.push(message);
            }
            Part::InlineData(blob) => images.push(blob.data.clone()),
            Part::Thought(_) | Part::Other(_) | Part::Empty => {}
        }
    }

    let mut messages = Vec::new();
    if !text.is_empty() || !tool_calls.is_empty() || !images.is_empty() {
        messages.push(OllamaMessage {
            role: role.to_string(),
            content: text,
            thinking: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            images: (!images.is_empty()).then_some(images),
            tool_name: None,
        });
    }
    messages.extend(tool_messages);
    messages
}

/// Convert an Ollama chat response (or stream chunk) into a response with
/// a single model candidate.
fn convert_response(response: OllamaChatResponse) -> GenerateContentResponse {
    let mut parts = Vec::new();
    if let Some(thinking) = response.message.thinking.filter(|t| !t.is_empty()) {
        parts.push(Part::Thought(thinking));
    }
    if !response.message.content.is_empty() {
        parts.push(Part::Text(response.message.content));
    }
    for call in response.message.tool_calls.unwrap_or_default() {
        parts.push(Part::FunctionCall(FunctionCall {
            id: None,
            name: call.function.name,
            args: call.function.arguments,
        }));
    }

    let usage_metadata = response.done.then(|| {
        let prompt = response.prompt_eval_count.unwrap_or(0);
        let candidates = response.eval_count.unwrap_or(0);
        UsageMetadata {
            prompt_token_count: Some(prompt),
            candidates_token_count: Some(candidates),
            total_token_count: Some(prompt.saturating_add(candidates)),
            ..Default::default()
        }
    });

    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content::model(parts)),
            finish_reason: response
                .done_reason
                .filter(|_| response.done)
                .map(|r| r.to_uppercase()),
            index: Some(0),
        }],
        usage_metadata,
        automatic_function_calling_history: None,
        model_version: Some(response.model),
    }
}

/// Parse one NDJSON line. Blank lines yield `None`; `{"error": ...}` lines
/// become stream errors.
fn parse_stream_line(line: &str) -> Option<Result<GenerateContentResponse>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Some(Err(HeadroomError::Api(ApiError::InvalidResponse(
                e.to_string(),
            ))))
        }
    };
    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return Some(Err(HeadroomError::Api(ApiError::StreamError(
            error.to_string(),
        ))));
    }
    Some(
        serde_json::from_value::<OllamaChatResponse>(value)
            .map(convert_response)
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string()))),
    )
}

#[async_trait]
impl ContentGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let body = self.build_request(&request, false);
        let response = self.post_chat(&body).await?;
        let api_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string())))?;
        Ok(convert_response(api_response))
    }

    async fn generate_content_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ResponseChunkStream> {
        let body = self.build_request(&request, true);
        let response = self.post_chat(&body).await?;
        let byte_stream = response.bytes_stream();

        let chunk_stream = async_stream::try_stream! {
            let mut lines = LineBuffer::new();

            for await chunk_result in byte_stream {
                let chunk = chunk_result
                    .map_err(|e| HeadroomError::Api(ApiError::StreamError(e.to_string())))?;
                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    if let Some(parsed) = parse_stream_line(&line) {
                        yield parsed?;
                    }
                }
            }

            if let Some(parsed) = lines.finish().as_deref().and_then(parse_stream_line) {
                yield parsed?;
            }
        };

        Ok(Box::pin(chunk_stream))
    }

    async fn count_tokens(&self, request: CountTokensRequest) -> Result<CountTokensResponse> {
        let chars: usize = request
            .contents
            .iter()
            .map(|c| c.text().chars().count())
            .sum();
        Ok(CountTokensResponse {
            total_tokens: (chars as f64 / CHARS_PER_TOKEN).ceil() as u32,
        })
    }

    async fn embed_content(&self, request: EmbedContentRequest) -> Result<EmbedContentResponse> {
        let url = format!("{}/api/embed", self.base_url);
        let model = ollama_model_name(&request.model).to_string();
        let body = OllamaEmbedRequest {
            model: model.clone(),
            input: request.texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &headers, &text, &model));
        }

        let embed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| HeadroomError::Api(ApiError::InvalidResponse(e.to_string())))?;
        Ok(EmbedContentResponse {
            embeddings: embed.embeddings,
        })
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl OllamaMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
            thinking: None,
            tool_calls: None,
            images: None,
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::content::FunctionResponse;
    use crate::llm::provider::GenerationConfig;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(contents: Vec<Content>) -> GenerateContentRequest {
        GenerateContentRequest::new("ollama/mistral", contents)
    }

    #[test]
    fn test_ollama_model_name_strips_prefix() {
        assert_eq!(ollama_model_name("ollama/mistral"), "mistral");
        assert_eq!(ollama_model_name("llama3.2:latest"), "llama3.2:latest");
    }

    #[test]
    fn test_build_request_maps_roles_and_system() {
        let generator = OllamaGenerator::new();
        let req = request(vec![
            Content::user_text("hi"),
            Content::model(vec![Part::Thought("hidden".into()), Part::Text("hello".into())]),
        ])
        .with_config(
            GenerationConfig::default()
                .with_system_instruction("be nice")
                .with_temperature(0.1),
        );

        let body = generator.build_request(&req, false);
        assert_eq!(body.model, "mistral");
        assert_eq!(body.messages.len(), 3);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].role, "user");
        assert_eq!(body.messages[2].role, "assistant");
        assert_eq!(body.messages[2].content, "hello");
        assert!(body.options.is_some());
    }

    #[test]
    fn test_convert_function_response_to_tool_message() {
        let content = Content::user(vec![Part::FunctionResponse(FunctionResponse {
            id: None,
            name: "ls".to_string(),
            response: json!({"files": ["a"]}),
        })]);
        let messages = convert_content(&content);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "tool");
        assert_eq!(messages[0].tool_name.as_deref(), Some("ls"));
    }

    #[test]
    fn test_convert_response_thinking_and_tools() {
        let response: OllamaChatResponse = serde_json::from_value(json!({
            "model": "mistral",
            "message": {
                "role": "assistant",
                "content": "",
                "thinking": "let me see",
                "tool_calls": [{"function": {"name": "ls", "arguments": {"path": "."}}}]
            },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 5,
            "eval_count": 7
        }))
        .unwrap();

        let converted = convert_response(response);
        let content = converted.first_content().unwrap();
        assert!(matches!(&content.parts[0], Part::Thought(t) if t == "let me see"));
        assert!(matches!(&content.parts[1], Part::FunctionCall(c) if c.name == "ls"));
        assert_eq!(
            converted.usage_metadata.unwrap().total_token_count,
            Some(12)
        );
        assert_eq!(converted.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_usage_total_saturates() {
        let response: OllamaChatResponse = serde_json::from_value(json!({
            "model": "mistral",
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "prompt_eval_count": u32::MAX,
            "eval_count": 3
        }))
        .unwrap();

        let usage = convert_response(response).usage_metadata.unwrap();
        assert_eq!(usage.total_token_count, Some(u32::MAX));
    }

    #[test]
    fn test_parse_stream_line_error() {
        assert!(parse_stream_line("   ").is_none());
        assert!(matches!(
            parse_stream_line(r#"{"error": "out of memory"}"#),
            Some(Err(HeadroomError::Api(ApiError::StreamError(_))))
        ));
    }

    #[tokio::test]
    async fn test_generate_content_with_mock_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "mistral", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral",
                "message": {"role": "assistant", "content": "Hello there"},
                "done": true,
                "prompt_eval_count": 3,
                "eval_count": 2
            })))
            .mount(&mock_server)
            .await;

        let generator = OllamaGenerator::with_base_url(mock_server.uri());
        let response = generator
            .generate_content(request(vec![Content::user_text("hi")]))
            .await
            .unwrap();

        assert_eq!(response.text(), Some("Hello there".to_string()));
        assert_eq!(response.usage_metadata.unwrap().prompt_token_count, Some(3));
    }

    #[tokio::test]
    async fn test_generate_content_stream_ndjson() {
        let mock_server = MockServer::start().await;
        let body = [
            json!({"model": "mistral", "message": {"role": "assistant", "content": "Hel"}, "done": false}),
            json!({"model": "mistral", "message": {"role": "assistant", "content": "lo"}, "done": false}),
            json!({"model": "mistral", "message": {"role": "assistant", "content": ""}, "done": true, "done_reason": "stop", "prompt_eval_count": 4, "eval_count": 2}),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let generator = OllamaGenerator::with_base_url(mock_server.uri());
        let stream = generator
            .generate_content_stream(request(vec![Content::user_text("hi")]))
            .await
            .unwrap();
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks.len(), 3);
        let texts: String = chunks
            .iter()
            .filter_map(|c| c.as_ref().ok().and_then(|r| r.text()))
            .collect();
        assert_eq!(texts, "Hello");
        let last = chunks[2].as_ref().unwrap();
        assert_eq!(
            last.usage_metadata.as_ref().unwrap().total_token_count,
            Some(6)
        );
    }

    /// Serve one chunked HTTP response whose body is written in separate
    /// pieces, so the client sees the split exactly where it was made.
    async fn serve_in_pieces(pieces: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length || n == 0 {
                        break;
                    }
                }
            }

            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n")
                .await
                .unwrap();
            for piece in pieces {
                socket
                    .write_all(format!("{:x}\r\n", piece.len()).as_bytes())
                    .await
                    .unwrap();
                socket.write_all(&piece).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_stream_keeps_character_split_across_chunks() {
        let line = format!(
            "{}\n",
            json!({"model": "mistral", "message": {"role": "assistant", "content": "caf\u{e9}"}, "done": true, "done_reason": "stop"})
        );
        let bytes = line.into_bytes();
        let split = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let base_url = serve_in_pieces(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;

        let generator = OllamaGenerator::with_base_url(base_url);
        let chunks: Vec<_> = generator
            .generate_content_stream(request(vec![Content::user_text("hi")]))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap().text(),
            Some("caf\u{e9}".to_string())
        );
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "model \"nope\" not found, try pulling it first"})),
            )
            .mount(&mock_server)
            .await;

        let generator = OllamaGenerator::with_base_url(mock_server.uri());
        let result = generator
            .generate_content(GenerateContentRequest::new(
                "ollama/nope",
                vec![Content::user_text("hi")],
            ))
            .await;

        assert!(matches!(
            result,
            Err(HeadroomError::Api(ApiError::ModelNotFound(ref m))) if m == "nope"
        ));
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let generator = OllamaGenerator::with_base_url(mock_server.uri());
        let err = generator
            .generate_content(request(vec![Content::user_text("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_embed_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(json!({"model": "nomic-embed-text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.5, 0.25], [0.1, 0.2]]
            })))
            .mount(&mock_server)
            .await;

        let generator = OllamaGenerator::with_base_url(mock_server.uri());
        let response = generator
            .embed_content(EmbedContentRequest {
                model: "ollama/nomic-embed-text".to_string(),
                texts: vec!["a".to_string(), "b".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[0], vec![0.5, 0.25]);
    }

    #[tokio::test]
    async fn test_count_tokens_approximation() {
        let generator = OllamaGenerator::new();
        let response = generator
            .count_tokens(CountTokensRequest {
                model: "ollama/mistral".to_string(),
                contents: vec![Content::user_text("abcdefghi")],
            })
            .await
            .unwrap();
        assert_eq!(response.total_tokens, 3);
    }

    #[tokio::test]
    async fn test_health_check_not_running() {
        let generator = OllamaGenerator::with_base_url("http://127.0.0.1:9");
        let result = generator.health_check().await;
        assert!(matches!(
            result,
            Err(HeadroomError::Api(ApiError::Network(ref m))) if m.contains("ollama serve")
        ));
    }
}
