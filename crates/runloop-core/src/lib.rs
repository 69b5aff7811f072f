// Agent Execution Engine
//
// This crate provides a backend-agnostic, streamable implementation of an
// agent turn loop (backend call → tool execution → repeat).
//
// Key design decisions:
// - Uses traits (Backend, Tool, ConversationStore) for pluggable backends
// - Progress is observable only through the typed event stream; dropping
//   the stream cancels the run
// - Sequence numbers are assigned at a single emit point, so ordering and
//   gap detection are reliable for any protocol adapter downstream
// - Tool failures are absorbed into failed results the model can react to;
//   only backend failures and the iteration limit terminate a run
// - ToolRegistry enforces unique qualified names at registration time

pub mod backend;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod events;
pub mod tool_types;
pub mod tools;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use backend::{
    Backend, BackendEvent, BackendRequest, BackendResponse, BackendStream, CompletionMetadata,
};
pub use config::EngineConfig;
pub use conversation::{ConversationState, ConversationStore, Role, Turn};
pub use engine::{EventStream, ExecutionEngine, RunHandle};
pub use error::{EngineError, Result};
pub use events::{EventEnvelope, ExecutionErrorKind, ExecutionEvent};
pub use tool_types::{ToolCall, ToolCallResult, ToolDescriptor, ToolOrigin};
pub use tools::{
    EchoTool, FailingTool, Tool, ToolFilter, ToolInternalError, ToolOutcome, ToolRegistry,
};
