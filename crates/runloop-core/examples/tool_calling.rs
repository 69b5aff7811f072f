//! Tool Calling Example - Engine Loop with Local Tools
//!
//! This example demonstrates the execution engine driving a scripted
//! backend through a tool-calling turn:
//! 1. Register local tools with a ToolRegistry
//! 2. Script a backend that requests a tool call, then answers
//! 3. Run the engine and consume the typed event stream
//!
//! No network access is needed; the backend is scripted in memory.
//!
//! Run with: cargo run -p runloop-core --example tool_calling

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use runloop_core::memory::{ScriptedBackend, ScriptedResponse};
use runloop_core::{
    ConversationState, EchoTool, EngineConfig, ExecutionEngine, ExecutionEvent, ToolCall,
    ToolRegistry,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. Register local tools
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(EchoTool))
        .expect("register echo tool");

    // 2. Script the backend: one turn requesting a tool call, one answering
    let backend = ScriptedBackend::with_responses(vec![
        ScriptedResponse::with_tools(
            "Let me echo that.",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "echo".to_string(),
                arguments: json!({"message": "hello from the engine"}),
            }],
        ),
        ScriptedResponse::chunks(["The echo tool ", "answered successfully."]),
    ]);

    // 3. Run and consume the event stream
    let config = EngineConfig::new("You are a helpful assistant.", "scripted-model");
    let engine = ExecutionEngine::new(config, backend, registry);

    let mut events = engine.run(ConversationState::with_user("Echo something for me"));
    while let Some(envelope) = events.next().await {
        match envelope.event {
            ExecutionEvent::TurnStarted { iteration } => {
                println!("--- turn {iteration} ---");
            }
            ExecutionEvent::ContentChunk { delta } => {
                println!("content: {delta:?}");
            }
            ExecutionEvent::ReasoningChunk { delta } => {
                println!("reasoning: {delta:?}");
            }
            ExecutionEvent::ToolCallStarted { call_id, tool_name } => {
                println!("tool call {call_id} -> {tool_name}");
            }
            ExecutionEvent::ToolCallCompleted {
                call_id, success, ..
            } => {
                println!("tool call {call_id} completed (success = {success})");
            }
            ExecutionEvent::TurnCompleted { iteration } => {
                println!("turn {iteration} completed");
            }
            ExecutionEvent::ExecutionComplete {
                iterations,
                final_response,
            } => {
                println!("done after {iterations} iterations: {final_response:?}");
            }
            ExecutionEvent::ExecutionError { kind, message } => {
                println!("failed ({kind:?}): {message}");
            }
        }
    }
}
