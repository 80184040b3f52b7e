// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use proptest::prelude::*;

use headroom::chat::{ChatSession, SendMessageParams};
use headroom::error::HeadroomError;
use headroom::llm::content::{
    Content, FunctionCall, FunctionResponse, GenerateContentResponse, Part, Role, UsageMetadata,
};
use headroom::llm::factory::AuthType;
use headroom::llm::mock_provider::{MockChunk, MockFailure, MockGenerator, MockReply};
use headroom::llm::providers::GeminiGenerator;
use headroom::llm::retry::RetryConfig;
use headroom::llm::GenerationConfig;
use headroom::telemetry::{ApiErrorEvent, ApiRequestEvent, ApiResponseEvent, TelemetrySink};

#[derive(Default)]
struct RecordingTelemetry {
    requests: Mutex<Vec<ApiRequestEvent>>,
    responses: Mutex<Vec<ApiResponseEvent>>,
    errors: Mutex<Vec<ApiErrorEvent>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn api_request(&self, event: &ApiRequestEvent) {
        self.requests.lock().unwrap().push(event.clone());
    }

    fn api_response(&self, event: &ApiResponseEvent) {
        self.responses.lock().unwrap().push(event.clone());
    }

    fn api_error(&self, event: &ApiErrorEvent) {
        self.errors.lock().unwrap().push(event.clone());
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter: 0.0,
    }
}

fn session_with(generator: &MockGenerator) -> (ChatSession, Arc<RecordingTelemetry>) {
    let telemetry = Arc::new(RecordingTelemetry::default());
    let session = ChatSession::builder(Arc::new(generator.clone()))
        .with_model("test-model")
        .with_retry_config(fast_retry())
        .with_auth_type(AuthType::Ollama)
        .with_telemetry(telemetry.clone())
        .build()
        .unwrap();
    (session, telemetry)
}

fn empty_reply() -> MockReply {
    MockReply::Response(GenerateContentResponse::default())
}

fn function_response_params() -> SendMessageParams {
    SendMessageParams::new(vec![Part::FunctionResponse(FunctionResponse {
        id: Some("call-1".to_string()),
        name: "read_file".to_string(),
        response: serde_json::json!({"content": "hello"}),
    })])
}

// ==================== Buffered sends ====================

#[tokio::test]
async fn test_send_message_records_exchange() {
    let generator = MockGenerator::new().with_text("Hi there");
    let (session, telemetry) = session_with(&generator);

    let response = session.send_message("Hello").await.unwrap();
    assert_eq!(response.text().as_deref(), Some("Hi there"));

    assert_eq!(
        session.get_history(false),
        vec![Content::user_text("Hello"), Content::model_text("Hi there")]
    );

    let requests = telemetry.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "test-model");
    assert_eq!(requests[0].request_text, "Hello");

    let responses = telemetry.responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].response_text.as_deref(), Some("Hi there"));
}

#[tokio::test]
async fn test_request_contains_curated_history() {
    let generator = MockGenerator::new()
        .with_text("A")
        .with_reply(empty_reply())
        .with_text("C");
    let (session, _) = session_with(&generator);

    session.send_message("a").await.unwrap();
    session.send_message("b").await.unwrap();

    // The unanswered turn stays in the comprehensive history only.
    assert_eq!(session.get_history(false).len(), 4);
    assert_eq!(
        session.get_history(true),
        vec![Content::user_text("a"), Content::model_text("A")]
    );

    session.send_message("c").await.unwrap();
    let request = generator.last_request().unwrap();
    assert_eq!(
        request.contents,
        vec![
            Content::user_text("a"),
            Content::model_text("A"),
            Content::user_text("c")
        ]
    );
    assert_eq!(request.model, "test-model");
}

#[tokio::test]
async fn test_empty_response_synthesizes_model_turn() {
    let generator = MockGenerator::new().with_reply(empty_reply());
    let (session, _) = session_with(&generator);

    session.send_message("hello").await.unwrap();
    assert_eq!(
        session.get_history(false),
        vec![Content::user_text("hello"), Content::model(Vec::new())]
    );
    assert!(session.get_history(true).is_empty());
}

#[tokio::test]
async fn test_function_response_without_output_adds_no_model_turn() {
    let generator = MockGenerator::new().with_reply(empty_reply());
    let (session, _) = session_with(&generator);

    session.send_message(function_response_params()).await.unwrap();

    let history = session.get_history(false);
    assert_eq!(history.len(), 1);
    assert!(history[0].is_function_response());
}

#[tokio::test]
async fn test_automatic_function_calling_history_recorded() {
    let call = Content::model(vec![Part::FunctionCall(FunctionCall {
        id: None,
        name: "ls".to_string(),
        args: serde_json::json!({"path": "."}),
    })]);
    let result = Content::user(vec![Part::FunctionResponse(FunctionResponse {
        id: None,
        name: "ls".to_string(),
        response: serde_json::json!({"files": ["a.rs"]}),
    })]);

    let mut response = GenerateContentResponse::from_content(Content::model_text("a.rs"));
    response.automatic_function_calling_history = Some(vec![
        Content::user_text("what files?"),
        call.clone(),
        result.clone(),
    ]);
    let generator = MockGenerator::new().with_reply(MockReply::Response(response));
    let (session, _) = session_with(&generator);

    session.send_message("what files?").await.unwrap();
    assert_eq!(
        session.get_history(false),
        vec![
            Content::user_text("what files?"),
            call,
            result,
            Content::model_text("a.rs")
        ]
    );
}

fn code_execution_turn() -> Content {
    serde_json::from_value(serde_json::json!({
        "role": "model",
        "parts": [
            {"executableCode": {"language": "PYTHON", "code": "print(6 * 7)"}},
            {"codeExecutionResult": {"outcome": "OUTCOME_OK", "output": "42"}}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_provider_specific_parts_survive_curation() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Response(GenerateContentResponse::from_content(
            code_execution_turn(),
        )))
        .with_text("It printed 42.");
    let (session, _) = session_with(&generator);

    session.send_message("run it").await.unwrap();
    assert_eq!(
        session.get_history(true),
        vec![Content::user_text("run it"), code_execution_turn()]
    );

    session.send_message("what did it print?").await.unwrap();
    let request = generator.last_request().unwrap();
    assert_eq!(request.contents[1], code_execution_turn());

    let sent = serde_json::to_value(&request.contents[1]).unwrap();
    assert_eq!(sent["parts"][0]["executableCode"]["code"], "print(6 * 7)");
    assert_eq!(sent["parts"][1]["codeExecutionResult"]["output"], "42");
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Fail(MockFailure::status(503, "overloaded")))
        .with_reply(MockReply::Fail(MockFailure::status(429, "slow down")))
        .with_text("finally");
    let (session, telemetry) = session_with(&generator);

    let response = session.send_message("hi").await.unwrap();
    assert_eq!(response.text().as_deref(), Some("finally"));
    assert_eq!(generator.call_count(), 3);
    assert!(telemetry.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_exhaustion_propagates() {
    let generator = MockGenerator::new().with_replies(vec![
        MockReply::Fail(MockFailure::status(500, "boom"));
        3
    ]);
    let (session, telemetry) = session_with(&generator);

    let err = session.send_message("hi").await.unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(generator.call_count(), 3);
    assert!(session.get_history(false).is_empty());

    let errors = telemetry.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, "server_error");
}

#[tokio::test]
async fn test_non_retryable_error_propagates_immediately() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Fail(MockFailure::status(400, "bad request")));
    let (session, telemetry) = session_with(&generator);

    let err = session.send_message("hi").await.unwrap_err();
    assert_eq!(err.status_code(), Some(400));
    assert_eq!(generator.call_count(), 1);
    assert!(session.get_history(false).is_empty());
    assert_eq!(telemetry.errors.lock().unwrap().len(), 1);
    assert!(telemetry.responses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_per_call_config_overrides_session_config() {
    let generator = MockGenerator::new();
    let session = ChatSession::builder(Arc::new(generator.clone()))
        .with_generation_config(
            GenerationConfig::default()
                .with_temperature(0.2)
                .with_max_output_tokens(100)
                .with_system_instruction("be brief"),
        )
        .build()
        .unwrap();

    session
        .send_message(
            SendMessageParams::text("hi").with_config(GenerationConfig::default().with_temperature(0.9)),
        )
        .await
        .unwrap();

    let config = generator.last_request().unwrap().config;
    assert_eq!(config.temperature, Some(0.9));
    assert_eq!(config.max_output_tokens, Some(100));
    assert_eq!(config.system_instruction.as_deref(), Some("be brief"));

    session.send_message("again").await.unwrap();
    assert_eq!(
        generator.last_request().unwrap().config.temperature,
        Some(0.2)
    );
}

#[tokio::test]
async fn test_back_to_back_sends_are_serialized() {
    let generator = MockGenerator::new()
        .with_text("first")
        .with_text("second")
        .with_delay(Duration::from_millis(20));
    let (session, _) = session_with(&generator);

    let (a, b) = tokio::join!(session.send_message("one"), session.send_message("two"));
    a.unwrap();
    b.unwrap();

    assert_eq!(generator.max_concurrent_calls(), 1);
    let requests = generator.recorded_requests();
    assert_eq!(requests.len(), 2);
    // The second send sees the first exchange.
    assert_eq!(requests[1].contents.len(), 3);

    let history = session.get_history(false);
    assert_eq!(history.len(), 4);
    assert!(history.iter().step_by(2).all(Content::is_user));
    assert!(history.iter().skip(1).step_by(2).all(Content::is_model));
}

// ==================== History accessors ====================

#[tokio::test]
async fn test_get_history_returns_deep_copies() {
    let generator = MockGenerator::new().with_text("reply");
    let (session, _) = session_with(&generator);
    session.send_message("hello").await.unwrap();

    let mut copy = session.get_history(false);
    copy[0].parts.push(Part::Text("tampered".to_string()));
    copy.clear();

    let history = session.get_history(false);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Content::user_text("hello"));
}

#[tokio::test]
async fn test_history_mutators() {
    let generator = MockGenerator::new();
    let (session, _) = session_with(&generator);

    session.add_history(Content::user_text("a"));
    session.add_history(Content::user_text("b"));
    assert_eq!(session.get_history(false).len(), 2);

    let replacement = vec![Content::user_text("x"), Content::model_text("y")];
    session.set_history(replacement.clone());
    assert_eq!(session.get_history(false), replacement);

    session.clear_history();
    assert!(session.get_history(false).is_empty());
    assert!(session.get_history(true).is_empty());
}

#[test]
fn test_invalid_initial_history_rejected() {
    let generator = MockGenerator::new();
    let bad = Content {
        role: Some(Role::Other("assistant".to_string())),
        parts: vec![Part::Text("hi".to_string())],
    };
    let result = ChatSession::builder(Arc::new(generator))
        .with_history(vec![Content::user_text("hello"), bad])
        .build();

    match result {
        Err(HeadroomError::InvalidHistory(msg)) => {
            assert_eq!(msg, "Role must be user or model, but got assistant.");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("invalid history was accepted"),
    }
}

#[test]
fn test_initial_history_is_used() {
    let generator = MockGenerator::new();
    let initial = vec![Content::user_text("hello"), Content::model_text("hi")];
    let session = ChatSession::builder(Arc::new(generator))
        .with_history(initial.clone())
        .build()
        .unwrap();
    assert_eq!(session.get_history(true), initial);
}

// ==================== Streaming ====================

#[tokio::test]
async fn test_stream_merges_text_fragments() {
    let generator = MockGenerator::new().with_reply(MockReply::Stream(vec![
        MockChunk::text("Hel"),
        MockChunk::text("lo"),
        MockChunk::text(" world"),
    ]));
    let (session, telemetry) = session_with(&generator);

    let chunks: Vec<_> = session
        .send_message_stream("greet")
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(Result::is_ok));

    assert_eq!(
        session.get_history(false),
        vec![
            Content::user_text("greet"),
            Content::model_text("Hello world")
        ]
    );
    let responses = telemetry.responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].response_text.as_deref(), Some("Hello world"));
}

#[tokio::test]
async fn test_stream_thoughts_forwarded_not_recorded() {
    let generator = MockGenerator::new().with_reply(MockReply::Stream(vec![
        MockChunk::content(Content::model(vec![Part::Thought("pondering".into())])),
        MockChunk::text("Answer"),
    ]));
    let (session, _) = session_with(&generator);

    let chunks: Vec<_> = session
        .send_message_stream("q")
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(chunks.len(), 2);

    assert_eq!(
        session.get_history(false),
        vec![Content::user_text("q"), Content::model_text("Answer")]
    );
}

#[tokio::test]
async fn test_stream_thought_only_adds_no_model_turn() {
    let generator = MockGenerator::new().with_reply(MockReply::Stream(vec![MockChunk::content(
        Content::model(vec![Part::Thought("hmm".into())]),
    )]));
    let (session, _) = session_with(&generator);

    let _: Vec<_> = session
        .send_message_stream("q")
        .await
        .unwrap()
        .collect()
        .await;
    // Thought chunks are not accumulated, so nothing usable came back.
    assert_eq!(
        session.get_history(false),
        vec![Content::user_text("q"), Content::model(Vec::new())]
    );
}

#[tokio::test]
async fn test_stream_without_valid_chunks_synthesizes_model_turn() {
    let usage = UsageMetadata {
        prompt_token_count: Some(4),
        candidates_token_count: Some(0),
        total_token_count: Some(4),
        ..Default::default()
    };
    let generator = MockGenerator::new().with_reply(MockReply::Stream(vec![
        MockChunk::text(""),
        MockChunk::Chunk(GenerateContentResponse::default().with_usage(usage.clone())),
    ]));
    let (session, telemetry) = session_with(&generator);

    let chunks: Vec<_> = session
        .send_message_stream("hello")
        .await
        .unwrap()
        .collect()
        .await;
    // Invalid chunks are still forwarded.
    assert_eq!(chunks.len(), 2);

    assert_eq!(
        session.get_history(false),
        vec![Content::user_text("hello"), Content::model(Vec::new())]
    );
    let responses = telemetry.responses.lock().unwrap();
    assert_eq!(responses[0].usage.as_ref(), Some(&usage));
}

#[tokio::test]
async fn test_stream_error_discards_partial_output() {
    let generator = MockGenerator::new().with_reply(MockReply::Stream(vec![
        MockChunk::text("partial"),
        MockChunk::Fail(MockFailure::message("connection reset")),
        MockChunk::text("never seen"),
    ]));
    let (session, telemetry) = session_with(&generator);

    let items: Vec<_> = session
        .send_message_stream("hi")
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());

    assert!(session.get_history(false).is_empty());
    assert_eq!(telemetry.errors.lock().unwrap().len(), 1);
    assert!(telemetry.responses.lock().unwrap().is_empty());

    // The session is usable afterwards.
    session.send_message("again").await.unwrap();
    assert_eq!(session.get_history(false).len(), 2);
}

#[tokio::test]
async fn test_stream_open_is_retried() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Fail(MockFailure::status(502, "bad gateway")))
        .with_reply(MockReply::Stream(vec![MockChunk::text("ok")]));
    let (session, _) = session_with(&generator);

    let chunks: Vec<_> = session
        .send_message_stream("hi")
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn test_stream_open_failure_reports_error() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Fail(MockFailure::status(401, "unauthorized")));
    let (session, telemetry) = session_with(&generator);

    let result = session.send_message_stream("hi").await;
    assert!(result.is_err());
    assert_eq!(telemetry.errors.lock().unwrap().len(), 1);
    assert!(session.get_history(false).is_empty());
}

#[tokio::test]
async fn test_dropping_stream_releases_session() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Stream(vec![
            MockChunk::text("one"),
            MockChunk::text("two"),
        ]))
        .with_text("next");
    let (session, _) = session_with(&generator);

    let mut stream = session.send_message_stream("first").await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.text().as_deref(), Some("one"));
    drop(stream);

    let response = tokio::time::timeout(Duration::from_secs(5), session.send_message("second"))
        .await
        .expect("session stayed busy after the stream was dropped")
        .unwrap();
    assert_eq!(response.text().as_deref(), Some("next"));

    // The cancelled exchange was never recorded.
    assert_eq!(
        session.get_history(false),
        vec![Content::user_text("second"), Content::model_text("next")]
    );
}

#[tokio::test]
async fn test_stream_then_buffered_send_sees_stream_history() {
    let generator = MockGenerator::new()
        .with_reply(MockReply::Stream(vec![MockChunk::text("streamed")]))
        .with_text("buffered");
    let (session, _) = session_with(&generator);

    let _: Vec<_> = session
        .send_message_stream("one")
        .await
        .unwrap()
        .collect()
        .await;
    session.send_message("two").await.unwrap();

    let request = generator.last_request().unwrap();
    assert_eq!(
        request.contents,
        vec![
            Content::user_text("one"),
            Content::model_text("streamed"),
            Content::user_text("two")
        ]
    );
}

#[tokio::test]
async fn test_stream_records_provider_specific_parts() {
    let generator = MockGenerator::new().with_reply(MockReply::Stream(vec![
        MockChunk::text("Running the code."),
        MockChunk::content(code_execution_turn()),
    ]));
    let (session, _) = session_with(&generator);

    let chunks: Vec<_> = session
        .send_message_stream("run it")
        .await
        .unwrap()
        .collect()
        .await;
    assert!(chunks.iter().all(Result::is_ok));

    let history = session.get_history(true);
    assert_eq!(history.len(), 3);
    assert_eq!(history[1], Content::model_text("Running the code."));
    assert_eq!(history[2], code_execution_turn());
}

/// Serve one chunked HTTP response, writing each piece separately.
async fn serve_in_pieces(content_type: &'static str, pieces: Vec<Vec<u8>>) -> String {
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

        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ntransfer-encoding: chunked\r\n\r\n",
            content_type
        );
        socket.write_all(head.as_bytes()).await.unwrap();
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
async fn test_stream_text_split_inside_character_is_recorded_intact() {
    let event = |text: &str| {
        format!(
            "data: {}\r\n\r\n",
            serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
            })
        )
    };
    let body = format!("{}{}", event("Un caf\u{e9}"), event(" na\u{ef}f.")).into_bytes();
    let pieces: Vec<Vec<u8>> = {
        let first = body.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let second = body.iter().rposition(|b| *b == 0xc3).unwrap() + 1;
        vec![
            body[..first].to_vec(),
            body[first..second].to_vec(),
            body[second..].to_vec(),
        ]
    };
    let base_url = serve_in_pieces("text/event-stream", pieces).await;

    let session = ChatSession::builder(Arc::new(GeminiGenerator::with_base_url("key", base_url)))
        .with_model("gemini-2.0-flash")
        .with_retry_config(fast_retry())
        .build()
        .unwrap();

    let texts: Vec<String> = session
        .send_message_stream("order")
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().text().unwrap_or_default())
        .collect()
        .await;
    assert_eq!(texts, vec!["Un caf\u{e9}", " na\u{ef}f."]);

    assert_eq!(
        session.get_history(false)[1],
        Content::model_text("Un caf\u{e9} na\u{ef}f.")
    );
}

// ==================== Alternation invariant ====================

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    EmptyCandidates,
    EmptyText,
    Failure,
    StreamFragments(Vec<String>),
}

impl Scripted {
    fn reply(&self) -> MockReply {
        match self {
            Scripted::Text(text) => MockReply::text(text.clone()),
            Scripted::EmptyCandidates => empty_reply(),
            Scripted::EmptyText => MockReply::text(""),
            Scripted::Failure => MockReply::Fail(MockFailure::status(400, "rejected")),
            Scripted::StreamFragments(parts) => {
                MockReply::Stream(parts.iter().map(|p| MockChunk::text(p.clone())).collect())
            }
        }
    }
}

fn scripted() -> impl Strategy<Value = Scripted> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Scripted::Text),
        Just(Scripted::EmptyCandidates),
        Just(Scripted::EmptyText),
        Just(Scripted::Failure),
        prop::collection::vec("[a-z]{0,4}", 0..4).prop_map(Scripted::StreamFragments),
    ]
}

fn assert_alternates(history: &[Content]) {
    assert_eq!(history.len() % 2, 0, "history ends on a user turn");
    for (i, content) in history.iter().enumerate() {
        if i % 2 == 0 {
            assert!(content.is_user(), "turn {} should be user", i);
        } else {
            assert!(content.is_model(), "turn {} should be model", i);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_history_alternates(script in prop::collection::vec((scripted(), any::<bool>()), 1..8)) {
        tokio_test::block_on(async {
            let generator = MockGenerator::new()
                .with_replies(script.iter().map(|(reply, _)| reply.reply()));
            let (session, _) = session_with(&generator);

            for (i, (_, streamed)) in script.iter().enumerate() {
                let prompt = format!("message {}", i);
                if *streamed {
                    if let Ok(stream) = session.send_message_stream(prompt).await {
                        let _: Vec<_> = stream.collect().await;
                    }
                } else {
                    let _ = session.send_message(prompt).await;
                }

                assert_alternates(&session.get_history(false));
                let curated = session.get_history(true);
                assert_alternates(&curated);
                assert!(curated.iter().all(|c| c.is_user() || !c.parts.is_empty()));
            }
        });
    }
}
