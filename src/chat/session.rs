// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! A [`ChatSession`] owns the conversation history and serializes sends:
//! only one request is in flight at a time. Two views of the history exist:
//!
//! - the *comprehensive* history holds every turn, including empty or
//!   invalid model output;
//! - the *curated* history (derived on demand) holds only answered turns and
//!   is what gets sent to the model.
//!
//! History always alternates between user and model turns. When the model
//! returns nothing usable an empty model turn is recorded so the next user
//! turn still follows a model turn.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;

use crate::chat::validation::{extract_curated_history, is_valid_response, validate_history};
use crate::error::Result;
use crate::llm::content::{
    structured_response, structured_response_text, Content, GenerateContentResponse, Part,
    UsageMetadata,
};
use crate::llm::factory::AuthType;
use crate::llm::provider::{
    ContentGenerator, GenerateContentRequest, GenerationConfig, ResponseChunkStream,
    DEFAULT_LOCAL_MODEL,
};
use crate::llm::retry::{is_transient_error, with_retry, RetryConfig, RetryOptions};
use crate::telemetry::{
    ApiErrorEvent, ApiRequestEvent, ApiResponseEvent, LogTelemetry, TelemetrySink,
};

/// Parameters for a single send
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    /// Parts of the new user turn
    pub message: Vec<Part>,
    /// Per-call overrides merged over the session config
    pub config: Option<GenerationConfig>,
}

impl SendMessageParams {
    pub fn new(message: Vec<Part>) -> Self {
        Self {
            message,
            config: None,
        }
    }

    /// A single text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Part::Text(text.into())])
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }
}

impl From<&str> for SendMessageParams {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for SendMessageParams {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// A multi-turn conversation with one generation backend
pub struct ChatSession {
    generator: Arc<dyn ContentGenerator>,
    model: String,
    generation_config: GenerationConfig,
    auth_type: Option<AuthType>,
    retry_config: RetryConfig,
    telemetry: Arc<dyn TelemetrySink>,
    history: Arc<Mutex<Vec<Content>>>,
    /// Held for the duration of a send; a stream holds it until the
    /// underlying network stream settles.
    pending: Arc<tokio::sync::Mutex<()>>,
}

impl ChatSession {
    /// Start a builder for a session backed by `generator`
    pub fn builder(generator: Arc<dyn ContentGenerator>) -> ChatSessionBuilder {
        ChatSessionBuilder::new(generator)
    }

    /// Session with default settings and empty history
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        ChatSessionBuilder::new(generator).build_unchecked()
    }

    /// Effective model id
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    pub fn auth_type(&self) -> Option<AuthType> {
        self.auth_type
    }

    /// Send a message and wait for the full response.
    ///
    /// Waits for any in-flight send first. The response is folded into
    /// history before this returns.
    pub async fn send_message(
        &self,
        params: impl Into<SendMessageParams>,
    ) -> Result<GenerateContentResponse> {
        let params = params.into();
        let _pending = self.pending.clone().lock_owned().await;

        let user_content = Content::user(params.message);
        let curated = self.get_history(true);
        let curated_len = curated.len();
        let request = self.build_request(curated, &user_content, params.config.as_ref());

        self.telemetry
            .api_request(&ApiRequestEvent::new(&self.model, request.flattened_text()));
        let start = Instant::now();

        let generator = Arc::clone(&self.generator);
        let result = with_retry(
            || {
                let generator = Arc::clone(&generator);
                let request = request.clone();
                async move { generator.generate_content(request).await }
            },
            self.retry_options(),
            "generate_content",
        )
        .await;

        let duration_ms = elapsed_ms(start);
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                self.telemetry
                    .api_error(&ApiErrorEvent::from_error(&self.model, &error, duration_ms));
                return Err(error);
            }
        };

        self.telemetry.api_response(&ApiResponseEvent::new(
            &self.model,
            duration_ms,
            response.usage_metadata.clone(),
            structured_response(&response),
        ));

        // Backend-driven tool exchanges beyond what we sent.
        let afc_history = response
            .automatic_function_calling_history
            .as_deref()
            .and_then(|full| full.get(curated_len..))
            .unwrap_or_default()
            .to_vec();
        let model_output: Vec<Content> = response.first_content().cloned().into_iter().collect();

        record_history(
            &mut lock_recovering(&self.history),
            user_content,
            model_output,
            afc_history,
        );

        Ok(response)
    }

    /// Send a message and stream the response.
    ///
    /// Opening the stream is retried like a buffered send. The returned
    /// stream keeps the session busy until the backend stream ends, errors,
    /// or the stream is dropped; consume or drop it before sending again
    /// from the same task.
    pub async fn send_message_stream(
        &self,
        params: impl Into<SendMessageParams>,
    ) -> Result<ResponseStream> {
        let params = params.into();
        let pending = self.pending.clone().lock_owned().await;

        let user_content = Content::user(params.message);
        let curated = self.get_history(true);
        let request = self.build_request(curated, &user_content, params.config.as_ref());

        self.telemetry
            .api_request(&ApiRequestEvent::new(&self.model, request.flattened_text()));
        let start = Instant::now();

        let generator = Arc::clone(&self.generator);
        let opened = with_retry(
            || {
                let generator = Arc::clone(&generator);
                let request = request.clone();
                async move { generator.generate_content_stream(request).await }
            },
            self.retry_options(),
            "generate_content_stream",
        )
        .await;

        let chunks = match opened {
            Ok(chunks) => chunks,
            Err(error) => {
                self.telemetry.api_error(&ApiErrorEvent::from_error(
                    &self.model,
                    &error,
                    elapsed_ms(start),
                ));
                return Err(error);
            }
        };

        Ok(self.process_stream(chunks, user_content, start, pending))
    }

    /// Usage metadata comes from the last chunk carrying it, valid or not,
    /// since some backends report it on an empty final chunk.
    fn process_stream(
        &self,
        mut chunks: ResponseChunkStream,
        user_content: Content,
        start: Instant,
        pending: OwnedMutexGuard<()>,
    ) -> ResponseStream {
        let history = Arc::clone(&self.history);
        let telemetry = Arc::clone(&self.telemetry);
        let model = self.model.clone();

        let stream = async_stream::stream! {
            let mut pending = Some(pending);
            let mut output: Vec<Content> = Vec::new();
            let mut usage: Option<UsageMetadata> = None;

            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) => {
                        if chunk.usage_metadata.is_some() {
                            usage = chunk.usage_metadata.clone();
                        }
                        if is_valid_response(&chunk) {
                            if let Some(content) = chunk.first_content() {
                                if !content.is_thought_content() {
                                    output.push(content.clone());
                                }
                            }
                        }
                        yield Ok(chunk);
                    }
                    Err(error) => {
                        drop(pending.take());
                        telemetry.api_error(&ApiErrorEvent::from_error(
                            &model,
                            &error,
                            elapsed_ms(start),
                        ));
                        yield Err(error);
                        return;
                    }
                }
            }

            drop(pending.take());

            let parts: Vec<Part> = output
                .iter()
                .flat_map(|content| content.parts.iter().cloned())
                .collect();
            telemetry.api_response(&ApiResponseEvent::new(
                &model,
                elapsed_ms(start),
                usage,
                structured_response_text(&parts),
            ));

            record_history(&mut lock_recovering(&history), user_content, output, Vec::new());
        };

        ResponseStream {
            inner: Box::pin(stream),
        }
    }

    /// Deep copy of the history; `curated` selects the curated view.
    pub fn get_history(&self, curated: bool) -> Vec<Content> {
        let history = lock_recovering(&self.history);
        if curated {
            extract_curated_history(&history)
        } else {
            history.clone()
        }
    }

    /// Remove all turns
    pub fn clear_history(&self) {
        lock_recovering(&self.history).clear();
    }

    /// Append a turn without checking alternation
    pub fn add_history(&self, content: Content) {
        lock_recovering(&self.history).push(content);
    }

    /// Replace the history without validation
    pub fn set_history(&self, history: Vec<Content>) {
        *lock_recovering(&self.history) = history;
    }

    fn build_request(
        &self,
        mut contents: Vec<Content>,
        user_content: &Content,
        overrides: Option<&GenerationConfig>,
    ) -> GenerateContentRequest {
        contents.push(user_content.clone());
        GenerateContentRequest::new(&self.model, contents)
            .with_config(self.generation_config.merged_with(overrides))
    }

    fn retry_options(&self) -> RetryOptions {
        RetryOptions {
            config: self.retry_config.clone(),
            should_retry: is_transient_error,
            auth_type: self.auth_type,
        }
    }
}

/// Streamed response of [`ChatSession::send_message_stream`].
///
/// Yields every backend chunk (including thoughts and invalid chunks). A
/// backend error is yielded once and ends the stream without touching
/// history. Dropping the stream early cancels the send: the session is
/// released and nothing is recorded.
pub struct ResponseStream {
    inner: Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>,
}

impl Stream for ResponseStream {
    type Item = Result<GenerateContentResponse>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// Usage metadata of the last chunk that carries any.
pub fn final_usage_metadata(chunks: &[GenerateContentResponse]) -> Option<UsageMetadata> {
    chunks
        .iter()
        .rev()
        .find_map(|chunk| chunk.usage_metadata.clone())
}

/// Builder for creating ChatSession instances
pub struct ChatSessionBuilder {
    generator: Arc<dyn ContentGenerator>,
    model: Option<String>,
    generation_config: GenerationConfig,
    history: Vec<Content>,
    auth_type: Option<AuthType>,
    retry_config: RetryConfig,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl ChatSessionBuilder {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            generator,
            model: None,
            generation_config: GenerationConfig::default(),
            history: Vec::new(),
            auth_type: None,
            retry_config: RetryConfig::default(),
            telemetry: None,
        }
    }

    /// Set the model name (falls back to the local default when empty)
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = config;
        self
    }

    /// Initial history, validated by [`build`](Self::build)
    pub fn with_history(mut self, history: Vec<Content>) -> Self {
        self.history = history;
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = Some(auth_type);
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the session. Fails if the initial history has a turn whose role
    /// is neither user nor model.
    pub fn build(self) -> Result<ChatSession> {
        validate_history(&self.history)?;
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> ChatSession {
        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());

        ChatSession {
            generator: self.generator,
            model,
            generation_config: self.generation_config,
            auth_type: self.auth_type,
            retry_config: self.retry_config,
            telemetry: self
                .telemetry
                .unwrap_or_else(|| Arc::new(LogTelemetry::ephemeral())),
            history: Arc::new(Mutex::new(self.history)),
            pending: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn lock_recovering(history: &Mutex<Vec<Content>>) -> MutexGuard<'_, Vec<Content>> {
    match history.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(target: "headroom.chat.session", "history lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Fold one exchange into the comprehensive history.
///
/// Thought turns are never recorded. A user turn is always followed by a
/// model turn, except when the model produced only thoughts or the user turn
/// carried function responses. Adjacent text-only model turns are merged.
pub(crate) fn record_history(
    history: &mut Vec<Content>,
    user_input: Content,
    model_output: Vec<Content>,
    afc_history: Vec<Content>,
) {
    let had_output = !model_output.is_empty();
    let substantive: Vec<Content> = model_output
        .into_iter()
        .filter(|content| !content.is_thought_content())
        .collect();

    let mut candidates: Vec<Content> = Vec::new();
    if !substantive.is_empty() && substantive.iter().all(|content| content.role.is_some()) {
        candidates = substantive;
    } else if substantive.is_empty() && had_output {
        // Thought-only output: no empty model turn.
    } else if !user_input.is_function_response() {
        candidates.push(Content::model(Vec::new()));
    }

    let used_afc = !afc_history.is_empty();
    if used_afc {
        history.extend(extract_curated_history(&afc_history));
    } else {
        history.push(user_input);
    }

    let mut consolidated: Vec<Content> = Vec::new();
    for content in candidates {
        if content.is_thought_content() {
            continue;
        }
        match consolidated.last_mut() {
            Some(last) if last.is_text_content() && content.is_text_content() => {
                merge_text_content(last, content);
            }
            _ => consolidated.push(content),
        }
    }

    let mut remaining = consolidated.into_iter().peekable();
    let merge_first = !used_afc
        && history.last().is_some_and(Content::is_text_content)
        && remaining.peek().is_some_and(Content::is_text_content);
    if merge_first {
        if let (Some(last), Some(first)) = (history.last_mut(), remaining.next()) {
            merge_text_content(last, first);
        }
    }
    history.extend(remaining);
}

/// Append `source`'s leading text to `target`'s leading text and carry over
/// the rest of `source`'s parts. Both must be text content.
fn merge_text_content(target: &mut Content, source: Content) {
    let mut parts = source.parts.into_iter();
    if let (Some(Part::Text(dst)), Some(Part::Text(src))) = (target.parts.first_mut(), parts.next())
    {
        dst.push_str(&src);
    }
    target.parts.extend(parts);
}
