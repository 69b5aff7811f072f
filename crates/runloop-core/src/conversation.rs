// Conversation types
//
// ConversationState is the append-only sequence of turns the engine drives.
// It is owned exclusively by the engine during a run and persisted by an
// external collaborator (ConversationStore) between runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::tool_types::{ToolCall, ToolCallResult};

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input
    User,
    /// Assistant response (may carry tool-call requests)
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single role-attributed unit of conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: Uuid,

    /// Turn role
    pub role: Role,

    /// Text content (empty for pure tool-call turns)
    pub content: String,

    /// Tool calls requested by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Tool call ID this turn answers (tool turns only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp when the turn was created
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a new user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant turn that requests tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a tool turn from a completed tool-call result
    pub fn tool_result(result: &ToolCallResult) -> Self {
        let content = match (&result.result, &result.error) {
            (_, Some(err)) => serde_json::json!({ "error": err }).to_string(),
            (Some(value), None) => value.to_string(),
            (None, None) => "{}".to_string(),
        };
        Self {
            id: Uuid::now_v7(),
            role: Role::Tool,
            content,
            tool_calls: None,
            tool_call_id: Some(result.tool_call_id.clone()),
            created_at: Utc::now(),
        }
    }

    /// Check if this turn has tool calls
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}

/// The ordered sequence of turns the engine drives.
///
/// Mutated only by appends; turns are never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Unique conversation ID
    pub id: Uuid,

    turns: Vec<Turn>,
}

impl ConversationState {
    /// Create a new empty conversation
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            turns: Vec::new(),
        }
    }

    /// Create a conversation seeded with a single user turn
    pub fn with_user(content: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.push(Turn::user(content));
        state
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns, in append order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if the conversation is empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Check if the conversation contains at least one user turn
    pub fn has_user_turn(&self) -> bool {
        self.turns.iter().any(|t| t.role == Role::User)
    }

    /// Text of the last assistant turn, if any
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant && !t.content.is_empty())
            .map(|t| t.content.as_str())
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ConversationStore - persistence collaborator
// ============================================================================

/// Trait for persisting conversations between runs.
///
/// Called by the caller of `run`, never by the engine itself.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation by ID
    async fn load(&self, id: Uuid) -> Result<Option<ConversationState>>;

    /// Save a conversation (insert or replace)
    async fn save(&self, state: ConversationState) -> Result<()>;
}
