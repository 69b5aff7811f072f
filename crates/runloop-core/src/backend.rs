// Reasoning backend abstraction
//
// The backend is a black-box request/response-or-stream service. A request
// carries the full conversation plus the tool descriptors visible to the
// run; the response is an incremental sequence of content/reasoning/tool-call
// fragments terminated by an explicit end marker.
//
// Which channel (content vs reasoning) a fragment belongs to is signalled by
// the backend through the BackendEvent variant, never guessed from content.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::conversation::Turn;
use crate::error::Result;
use crate::tool_types::{ToolCall, ToolDescriptor};

/// Type alias for the backend response stream
pub type BackendStream = Pin<Box<dyn Stream<Item = Result<BackendEvent>> + Send>>;

/// Incremental units yielded by a streaming backend response
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// Primary content delta
    ContentDelta(String),
    /// Reasoning content delta (optional side channel)
    ReasoningDelta(String),
    /// Structured tool-call requests, in backend emission order
    ToolCalls(Vec<ToolCall>),
    /// Explicit end marker
    Done(CompletionMetadata),
    /// Error during streaming
    Error(String),
}

/// Metadata about a completed backend response
#[derive(Debug, Clone, Default)]
pub struct CompletionMetadata {
    /// Total tokens used
    pub total_tokens: Option<u32>,
    /// Prompt tokens
    pub prompt_tokens: Option<u32>,
    /// Completion tokens
    pub completion_tokens: Option<u32>,
    /// Model used
    pub model: Option<String>,
    /// Finish reason
    pub finish_reason: Option<String>,
}

/// Request sent to the backend for one turn
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// System prompt, prepended by the engine (not part of ConversationState)
    pub system_prompt: Option<String>,
    /// Model identifier
    pub model: String,
    /// Full conversation so far
    pub turns: Vec<Turn>,
    /// Tool descriptors visible to this run
    pub tools: Vec<ToolDescriptor>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// Trait for reasoning backends
///
/// Implementations handle provider-specific API calls and response parsing.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a streaming response for one turn
    async fn stream_turn(&self, request: BackendRequest) -> Result<BackendStream>;

    /// Complete a turn without streaming (convenience method)
    async fn complete_turn(&self, request: BackendRequest) -> Result<BackendResponse> {
        use futures::StreamExt;

        let mut stream = self.stream_turn(request).await?;
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut metadata = CompletionMetadata::default();

        while let Some(event) = stream.next().await {
            match event? {
                BackendEvent::ContentDelta(delta) => text.push_str(&delta),
                BackendEvent::ReasoningDelta(_) => {}
                BackendEvent::ToolCalls(calls) => tool_calls = calls,
                BackendEvent::Done(meta) => metadata = meta,
                BackendEvent::Error(err) => return Err(crate::error::EngineError::backend(err)),
            }
        }

        Ok(BackendResponse {
            text,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            metadata,
        })
    }
}

/// Response from a backend call (non-streaming)
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub metadata: CompletionMetadata,
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    async fn stream_turn(&self, request: BackendRequest) -> Result<BackendStream> {
        (**self).stream_turn(request).await
    }
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    async fn stream_turn(&self, request: BackendRequest) -> Result<BackendStream> {
        (**self).stream_turn(request).await
    }
}
