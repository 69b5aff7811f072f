// Execution events for streaming
//
// ExecutionEvent is the typed, strictly-ordered progress contract of a run.
// Consumers (CLI renderers, protocol bridges, chat surfaces) branch on the
// closed enum, so a new event kind is a compile error at every consumer.
//
// Guarantees:
// - sequence numbers are strictly increasing with no gaps, scoped to the run
// - exactly one terminal event (execution_complete or execution_error), always last
// - chunk events for a turn are emitted in generation order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind carried by a terminal `ExecutionError` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Transport/protocol failure talking to the reasoning backend
    BackendError,
    /// Turn loop exceeded the configured iteration bound
    IterationLimitExceeded,
    /// Conversation was not runnable (no user turn)
    InvalidConversation,
    /// Unexpected internal failure
    Internal,
}

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A turn iteration started
    TurnStarted { iteration: usize },

    /// Incremental primary content from the backend
    ContentChunk { delta: String },

    /// Incremental reasoning content from the backend (side channel)
    ReasoningChunk { delta: String },

    /// A tool call was requested and is being dispatched
    ToolCallStarted { call_id: String, tool_name: String },

    /// A dispatched tool call finished
    ToolCallCompleted {
        call_id: String,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },

    /// A turn finished without requesting tools
    TurnCompleted { iteration: usize },

    /// Terminal: the run completed successfully
    ExecutionComplete {
        iterations: usize,
        final_response: Option<String>,
    },

    /// Terminal: the run failed
    ExecutionError {
        kind: ExecutionErrorKind,
        message: String,
    },
}

impl ExecutionEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ExecutionComplete { .. } | ExecutionEvent::ExecutionError { .. }
        )
    }
}

/// An `ExecutionEvent` stamped with its run-scoped sequence number.
///
/// Sequence numbers are assigned at the engine's single emit point, so a
/// consumer re-expressing the stream as an external protocol can rely on
/// them for ordering and gap detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonically increasing sequence number, starting at 0
    pub seq: u64,

    /// Timestamp when the event was emitted
    pub timestamp: DateTime<Utc>,

    /// The event payload
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

impl EventEnvelope {
    /// Check if this envelope carries the terminal event
    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_detection() {
        assert!(ExecutionEvent::ExecutionComplete {
            iterations: 1,
            final_response: None
        }
        .is_terminal());
        assert!(ExecutionEvent::ExecutionError {
            kind: ExecutionErrorKind::BackendError,
            message: "boom".to_string()
        }
        .is_terminal());
        assert!(!ExecutionEvent::TurnStarted { iteration: 1 }.is_terminal());
    }

    #[test]
    fn test_envelope_serialization_tags() {
        let envelope = EventEnvelope {
            seq: 3,
            timestamp: Utc::now(),
            event: ExecutionEvent::ContentChunk {
                delta: "hi".to_string(),
            },
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "content_chunk");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["delta"], "hi");
    }

    #[test]
    fn test_error_kind_tag() {
        let event = ExecutionEvent::ExecutionError {
            kind: ExecutionErrorKind::IterationLimitExceeded,
            message: "iteration limit (10) exceeded".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "iteration_limit_exceeded");
    }
}
