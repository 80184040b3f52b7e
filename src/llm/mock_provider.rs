// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock content generator for testing
//!
//! Provides a scripted implementation of the ContentGenerator trait that can
//! be used in tests without making real API calls. Replies are consumed in
//! order; once the queue is empty a default text reply is returned.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ApiError, HeadroomError, Result};
use crate::llm::content::{Content, GenerateContentResponse, UsageMetadata};
use crate::llm::provider::{
    ContentGenerator, CountTokensRequest, CountTokensResponse, EmbedContentRequest,
    EmbedContentResponse, GenerateContentRequest, ResponseChunkStream,
};

/// A scripted failure
#[derive(Clone, Debug)]
pub struct MockFailure {
    /// HTTP-equivalent status, if any
    pub status: Option<u16>,
    pub message: String,
}

impl MockFailure {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    fn to_error(&self) -> HeadroomError {
        match self.status {
            Some(429) => HeadroomError::Api(ApiError::RateLimited(0)),
            Some(status) => HeadroomError::Api(ApiError::ServerError {
                status,
                message: self.message.clone(),
            }),
            None => HeadroomError::Api(ApiError::Network(self.message.clone())),
        }
    }
}

/// One item of a scripted stream
#[derive(Clone, Debug)]
pub enum MockChunk {
    Chunk(GenerateContentResponse),
    Fail(MockFailure),
}

impl MockChunk {
    /// A chunk holding a single model turn
    pub fn content(content: Content) -> Self {
        MockChunk::Chunk(GenerateContentResponse::from_content(content))
    }

    /// A chunk holding model text
    pub fn text(text: impl Into<String>) -> Self {
        Self::content(Content::model_text(text))
    }
}

/// A scripted reply
#[derive(Clone, Debug)]
pub enum MockReply {
    Response(GenerateContentResponse),
    Stream(Vec<MockChunk>),
    Fail(MockFailure),
}

impl MockReply {
    /// A buffered reply holding model text
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Response(GenerateContentResponse::from_content(Content::model_text(
            text,
        )))
    }

    /// A buffered reply holding one model turn
    pub fn content(content: Content) -> Self {
        MockReply::Response(GenerateContentResponse::from_content(content))
    }
}

fn default_reply() -> MockReply {
    MockReply::Response(
        GenerateContentResponse::from_content(Content::model_text("Mock response")).with_usage(
            UsageMetadata {
                prompt_token_count: Some(10),
                candidates_token_count: Some(20),
                total_token_count: Some(30),
                ..Default::default()
            },
        ),
    )
}

/// A mock content generator for testing
#[derive(Clone)]
pub struct MockGenerator {
    name: String,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    call_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<GenerateContentRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock generator lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockGenerator {
    /// Create a mock generator with an empty reply queue
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Queue a reply
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queue several replies (returned in order)
    pub fn with_replies(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        lock(&self.replies).extend(replies);
        self
    }

    /// Queue a text reply
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_reply(MockReply::text(text))
    }

    /// Hold each call open for `delay` before replying
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a reply on a shared handle
    pub fn push_reply(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Number of generate calls (buffered and streaming)
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of generate calls observed running at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<GenerateContentRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<GenerateContentRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Record the call, wait out the configured delay, and pop the next reply.
    async fn begin_call(&self, request: GenerateContentRequest) -> MockReply {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded_requests).push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        lock(&self.replies).pop_front().unwrap_or_else(default_reply)
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        match self.begin_call(request).await {
            MockReply::Response(response) => Ok(response),
            MockReply::Fail(failure) => Err(failure.to_error()),
            MockReply::Stream(chunks) => {
                // Buffered callers of a streamed script get the parts joined.
                let mut parts = Vec::new();
                let mut usage = None;
                for chunk in chunks {
                    match chunk {
                        MockChunk::Chunk(response) => {
                            if let Some(content) = response.first_content() {
                                parts.extend(content.parts.iter().cloned());
                            }
                            usage = response.usage_metadata.or(usage);
                        }
                        MockChunk::Fail(failure) => return Err(failure.to_error()),
                    }
                }
                let mut response = GenerateContentResponse::from_content(Content::model(parts));
                response.usage_metadata = usage;
                Ok(response)
            }
        }
    }

    async fn generate_content_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ResponseChunkStream> {
        let items: Vec<Result<GenerateContentResponse>> = match self.begin_call(request).await {
            MockReply::Response(response) => vec![Ok(response)],
            MockReply::Fail(failure) => return Err(failure.to_error()),
            MockReply::Stream(chunks) => chunks
                .into_iter()
                .map(|chunk| match chunk {
                    MockChunk::Chunk(response) => Ok(response),
                    MockChunk::Fail(failure) => Err(failure.to_error()),
                })
                .collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }

    async fn count_tokens(&self, request: CountTokensRequest) -> Result<CountTokensResponse> {
        let chars: usize = request.contents.iter().map(|c| c.text().len()).sum();
        Ok(CountTokensResponse {
            total_tokens: (chars / 4).max(1) as u32,
        })
    }

    async fn embed_content(&self, request: EmbedContentRequest) -> Result<EmbedContentResponse> {
        Ok(EmbedContentResponse {
            embeddings: request.texts.iter().map(|_| vec![0.0; 3]).collect(),
        })
    }
}
