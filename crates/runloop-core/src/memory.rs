// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them perfect for:
// - Unit and integration tests
// - Quick prototyping without a real backend or database

use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::{
    Backend, BackendEvent, BackendRequest, BackendStream, CompletionMetadata,
};
use crate::conversation::{ConversationState, ConversationStore};
use crate::error::Result;
use crate::tool_types::ToolCall;

// ============================================================================
// InMemoryConversationStore
// ============================================================================

/// In-memory conversation store keyed by conversation ID
#[derive(Debug, Default, Clone)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<Uuid, ConversationState>>>,
}

impl InMemoryConversationStore {
    /// Create a new in-memory conversation store
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored conversation IDs
    pub async fn ids(&self) -> Vec<Uuid> {
        self.conversations.read().await.keys().copied().collect()
    }

    /// Clear all conversations
    pub async fn clear(&self) {
        self.conversations.write().await.clear();
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: Uuid) -> Result<Option<ConversationState>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn save(&self, state: ConversationState) -> Result<()> {
        self.conversations.write().await.insert(state.id, state);
        Ok(())
    }
}

// ============================================================================
// ScriptedBackend - Returns predefined responses
// ============================================================================

/// A scripted backend response
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    /// Content deltas, emitted in order
    pub content: Vec<String>,
    /// Reasoning deltas, emitted before content
    pub reasoning: Vec<String>,
    /// Tool calls to request after the deltas
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Mid-stream error instead of the end marker
    pub stream_error: Option<String>,
    /// Fail the request itself before any stream is produced
    pub request_error: Option<String>,
}

impl ScriptedResponse {
    /// A single-chunk text response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![text.into()],
            ..Default::default()
        }
    }

    /// A multi-chunk text response
    pub fn chunks(chunks: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            content: chunks.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    /// A response that requests tool calls
    pub fn with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        Self {
            content: if text.is_empty() { Vec::new() } else { vec![text] },
            tool_calls: Some(tool_calls),
            ..Default::default()
        }
    }

    /// Attach reasoning deltas to this response
    pub fn with_reasoning(mut self, chunks: impl IntoIterator<Item = &'static str>) -> Self {
        self.reasoning = chunks.into_iter().map(String::from).collect();
        self
    }

    /// A response that fails mid-stream
    pub fn stream_error(message: impl Into<String>) -> Self {
        Self {
            stream_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// A response that fails before any stream is produced
    pub fn request_error(message: impl Into<String>) -> Self {
        Self {
            request_error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Scripted backend for testing.
///
/// Returns predefined responses in sequence and logs every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Arc<RwLock<Vec<ScriptedResponse>>>,
    call_index: Arc<RwLock<usize>>,
    call_log: Arc<RwLock<Vec<BackendRequest>>>,
}

impl ScriptedBackend {
    /// Create a new scripted backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scripted backend with responses
    pub fn with_responses(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Arc::new(RwLock::new(responses)),
            ..Default::default()
        }
    }

    /// Add a response to the queue
    pub async fn add_response(&self, response: ScriptedResponse) {
        self.responses.write().await.push(response);
    }

    /// Get the logged requests
    pub async fn calls(&self) -> Vec<BackendRequest> {
        self.call_log.read().await.clone()
    }

    /// Number of requests made so far
    pub async fn call_count(&self) -> usize {
        self.call_log.read().await.len()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn stream_turn(&self, request: BackendRequest) -> Result<BackendStream> {
        self.call_log.write().await.push(request);

        let mut index = self.call_index.write().await;
        let responses = self.responses.read().await;
        let response = responses
            .get(*index)
            .cloned()
            .unwrap_or_else(|| ScriptedResponse::text("Scripted response (queue exhausted)"));
        *index += 1;
        drop(responses);
        drop(index);

        if let Some(message) = response.request_error {
            return Err(crate::error::EngineError::backend(message));
        }

        let mut events: Vec<Result<BackendEvent>> = Vec::new();
        for delta in response.reasoning {
            events.push(Ok(BackendEvent::ReasoningDelta(delta)));
        }
        for delta in response.content {
            events.push(Ok(BackendEvent::ContentDelta(delta)));
        }
        if let Some(message) = response.stream_error {
            events.push(Ok(BackendEvent::Error(message)));
        } else {
            if let Some(tool_calls) = response.tool_calls {
                events.push(Ok(BackendEvent::ToolCalls(tool_calls)));
            }
            events.push(Ok(BackendEvent::Done(CompletionMetadata::default())));
        }

        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;

    #[tokio::test]
    async fn test_in_memory_conversation_store() {
        let store = InMemoryConversationStore::new();
        let mut state = ConversationState::with_user("Hello");
        state.push(Turn::assistant("Hi"));
        let id = state.id;

        store.save(state).await.unwrap();

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(store.load(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scripted_backend_sequence() {
        let backend = ScriptedBackend::new();
        backend.add_response(ScriptedResponse::text("first")).await;
        backend.add_response(ScriptedResponse::text("second")).await;

        let request = BackendRequest {
            system_prompt: None,
            model: "test".to_string(),
            turns: Vec::new(),
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        };

        let first = backend.complete_turn(request.clone()).await.unwrap();
        assert_eq!(first.text, "first");
        let second = backend.complete_turn(request).await.unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(backend.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_scripted_backend_stream_error() {
        let backend =
            ScriptedBackend::with_responses(vec![ScriptedResponse::stream_error("boom")]);

        let request = BackendRequest {
            system_prompt: None,
            model: "test".to_string(),
            turns: Vec::new(),
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        };

        let err = backend.complete_turn(request).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
