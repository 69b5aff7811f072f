// Execution Engine
//
// The turn-taking state machine. Coordinates:
// - Streaming backend output into the event stream
// - Detecting and dispatching requested tool calls via the ToolRegistry
// - Appending results to the conversation and starting the next turn
//
// A run produces a lazy, finite, non-restartable stream of EventEnvelope.
// The loop itself executes in a spawned task feeding a bounded channel;
// when the consumer drops the stream the engine observes the closed
// channel at its next emit, releases the backend stream, and stops.
// Pending tool tasks are left to finish detached and their results are
// discarded, since remote servers have no guaranteed abort primitive.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::backend::{Backend, BackendEvent, BackendRequest};
use crate::config::EngineConfig;
use crate::conversation::{ConversationState, Turn};
use crate::error::EngineError;
use crate::events::{EventEnvelope, ExecutionEvent};
use crate::tool_types::{ToolCall, ToolCallResult};
use crate::tools::ToolRegistry;

/// Type alias for the stream of events a run produces
pub type EventStream = Pin<Box<dyn Stream<Item = EventEnvelope> + Send>>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The execution engine.
///
/// Fully valid immediately after construction; `run` can be called any
/// number of times, each call producing an independent event stream.
pub struct ExecutionEngine<B: Backend> {
    config: EngineConfig,
    backend: Arc<B>,
    registry: Arc<ToolRegistry>,
}

impl<B: Backend + 'static> ExecutionEngine<B> {
    /// Create a new execution engine
    pub fn new(config: EngineConfig, backend: B, registry: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
            registry,
        }
    }

    /// Create a new execution engine from an Arc-wrapped backend
    pub fn with_arc(config: EngineConfig, backend: Arc<B>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            backend,
            registry,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the turn loop over a conversation, producing an event stream.
    ///
    /// The engine owns the state exclusively for the duration of the run.
    /// Callers that persist conversations between runs should use
    /// [`ExecutionEngine::run_with_state`] to get the mutated state back.
    pub fn run(&self, state: ConversationState) -> EventStream {
        self.spawn_run(state, None)
    }

    /// Run the turn loop, also handing the final conversation state back
    /// once the run settles.
    ///
    /// The receiver resolves after the terminal event (or after
    /// cancellation); the caller passes the state to its
    /// `ConversationStore`, never the engine.
    pub fn run_with_state(&self, state: ConversationState) -> RunHandle {
        let (state_tx, state_rx) = tokio::sync::oneshot::channel();
        let events = self.spawn_run(state, Some(state_tx));
        RunHandle {
            events,
            final_state: state_rx,
        }
    }

    fn spawn_run(
        &self,
        state: ConversationState,
        state_tx: Option<tokio::sync::oneshot::Sender<ConversationState>>,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = self.config.clone();
        let backend = Arc::clone(&self.backend);
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let mut sink = EventSink::new(tx);
            let mut state = state;
            match drive(&config, backend, registry, &mut state, &mut sink).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => {
                    info!(conversation_id = %state.id, "Run cancelled by consumer");
                }
                Err(err) => {
                    // terminal_kind is None only for Cancelled, handled above
                    if let Some(kind) = err.terminal_kind() {
                        warn!(conversation_id = %state.id, error = %err, "Run failed");
                        let _ = sink
                            .emit(ExecutionEvent::ExecutionError {
                                kind,
                                message: err.to_string(),
                            })
                            .await;
                    }
                }
            }
            if let Some(state_tx) = state_tx {
                let _ = state_tx.send(state);
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Append a user turn, then run (convenience method)
    pub fn run_turn(
        &self,
        mut state: ConversationState,
        user_message: impl Into<String>,
    ) -> EventStream {
        state.push(Turn::user(user_message));
        self.run(state)
    }

    /// Run to completion, collecting every event (convenience for callers
    /// that do not need incremental delivery)
    pub async fn run_collect(&self, state: ConversationState) -> Vec<EventEnvelope> {
        self.run(state).collect().await
    }
}

/// A running execution plus a way to recover the final conversation state
pub struct RunHandle {
    /// The run's event stream
    pub events: EventStream,
    /// Resolves to the mutated conversation once the run settles
    pub final_state: tokio::sync::oneshot::Receiver<ConversationState>,
}

// ============================================================================
// Event sink - the single emit point
// ============================================================================

/// Assigns sequence numbers and forwards events to the consumer.
///
/// All events of a run pass through this one sink, which is what makes
/// the strictly-increasing no-gaps guarantee hold.
struct EventSink {
    tx: mpsc::Sender<EventEnvelope>,
    next_seq: u64,
}

impl EventSink {
    fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx, next_seq: 0 }
    }

    /// Resolves once the consumer has dropped the event stream
    async fn consumer_gone(&self) {
        self.tx.closed().await
    }

    async fn emit(&mut self, event: ExecutionEvent) -> Result<(), EngineError> {
        let envelope = EventEnvelope {
            seq: self.next_seq,
            timestamp: Utc::now(),
            event,
        };
        self.next_seq += 1;
        self.tx
            .send(envelope)
            .await
            .map_err(|_| EngineError::Cancelled)
    }
}

// ============================================================================
// The turn loop
// ============================================================================

async fn drive<B: Backend>(
    config: &EngineConfig,
    backend: Arc<B>,
    registry: Arc<ToolRegistry>,
    state: &mut ConversationState,
    sink: &mut EventSink,
) -> Result<(), EngineError> {
    if !state.has_user_turn() {
        return Err(EngineError::NoUserTurn);
    }

    info!(conversation_id = %state.id, "Starting run");

    // Descriptors visible to this run are fixed at run start
    let descriptors = registry.descriptors();

    let mut iteration = 0;
    let mut final_response: Option<String> = None;

    loop {
        iteration += 1;

        if iteration > config.max_iterations {
            // No further backend request is issued past the bound
            return Err(EngineError::IterationLimitExceeded(config.max_iterations));
        }

        sink.emit(ExecutionEvent::TurnStarted { iteration }).await?;

        let request = BackendRequest {
            system_prompt: if config.system_prompt.is_empty() {
                None
            } else {
                Some(config.system_prompt.clone())
            },
            model: config.model.clone(),
            turns: state.turns().to_vec(),
            tools: descriptors.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let turn = stream_backend_turn(config, backend.as_ref(), request, sink).await?;

        let has_tool_calls = turn
            .tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty());

        // Record the assistant turn (even with empty text if there are tool calls)
        if !turn.text.is_empty() || has_tool_calls {
            let assistant_turn = if let Some(calls) = &turn.tool_calls {
                Turn::assistant_with_tools(&turn.text, calls.clone())
            } else {
                Turn::assistant(&turn.text)
            };
            state.push(assistant_turn);
            if !turn.text.is_empty() {
                final_response = Some(turn.text.clone());
            }
        }

        if has_tool_calls {
            let calls = turn.tool_calls.unwrap_or_default();
            dispatch_tool_calls(config, &registry, calls, state, sink).await?;
            continue;
        }

        sink.emit(ExecutionEvent::TurnCompleted { iteration }).await?;
        sink.emit(ExecutionEvent::ExecutionComplete {
            iterations: iteration,
            final_response,
        })
        .await?;

        info!(conversation_id = %state.id, iterations = iteration, "Run completed");
        return Ok(());
    }
}

/// Result of streaming one backend turn
struct StreamedTurn {
    text: String,
    tool_calls: Option<Vec<ToolCall>>,
}

/// Open a backend stream under the request timeout and forward its
/// incremental units as chunk events.
async fn stream_backend_turn<B: Backend>(
    config: &EngineConfig,
    backend: &B,
    request: BackendRequest,
    sink: &mut EventSink,
) -> Result<StreamedTurn, EngineError> {
    let mut stream = tokio::time::timeout(config.backend_timeout, backend.stream_turn(request))
        .await
        .map_err(|_| EngineError::backend("backend request timed out"))??;

    let mut text = String::new();
    let mut tool_calls: Option<Vec<ToolCall>> = None;

    loop {
        // Awaiting the backend is a suspension point: watch for the
        // consumer dropping the stream (dropping `stream` here releases
        // the backend connection) and bound the wait for each unit so a
        // stalled backend cannot park the run forever.
        let next = tokio::select! {
            _ = sink.consumer_gone() => return Err(EngineError::Cancelled),
            next = tokio::time::timeout(config.backend_timeout, stream.next()) => {
                next.map_err(|_| EngineError::backend("backend stream stalled"))?
            }
        };
        let Some(event) = next else {
            break;
        };
        match event? {
            BackendEvent::ContentDelta(delta) => {
                if !delta.is_empty() {
                    text.push_str(&delta);
                    sink.emit(ExecutionEvent::ContentChunk { delta }).await?;
                }
            }
            BackendEvent::ReasoningDelta(delta) => {
                if !delta.is_empty() {
                    sink.emit(ExecutionEvent::ReasoningChunk { delta }).await?;
                }
            }
            BackendEvent::ToolCalls(calls) => {
                tool_calls = Some(calls);
            }
            BackendEvent::Done(_metadata) => break,
            BackendEvent::Error(message) => {
                return Err(EngineError::Backend(message));
            }
        }
    }

    // Dropping the stream here releases the backend connection before
    // any tool dispatch starts.
    Ok(StreamedTurn { text, tool_calls })
}

/// Dispatch the turn's tool calls.
///
/// Dispatches run concurrently as spawned tasks, but result events are
/// re-serialized into the backend's original request order: the handle
/// vector is the reordering buffer, awaited front to back with the call
/// id carried alongside each handle.
async fn dispatch_tool_calls(
    config: &EngineConfig,
    registry: &Arc<ToolRegistry>,
    calls: Vec<ToolCall>,
    state: &mut ConversationState,
    sink: &mut EventSink,
) -> Result<(), EngineError> {
    // Started events first, in backend emission order (the authoritative
    // tie-break for multi-call turns)
    for call in &calls {
        sink.emit(ExecutionEvent::ToolCallStarted {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
        })
        .await?;
    }

    let handles: Vec<(String, JoinHandle<ToolCallResult>)> = calls
        .into_iter()
        .map(|call| {
            let registry = Arc::clone(registry);
            let timeout = config.tool_timeout;
            let call_id = call.id.clone();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, registry.invoke(&call)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(tool_name = %call.name, tool_call_id = %call.id, "Tool call timed out");
                        ToolCallResult::failure(
                            &call.id,
                            format!("ToolExecutionError: tool '{}' timed out", call.name),
                        )
                    }
                }
            });
            (call_id, handle)
        })
        .collect();

    for (call_id, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(_) => {
                ToolCallResult::failure(&call_id, "ToolExecutionError: tool task panicked")
            }
        };

        sink.emit(ExecutionEvent::ToolCallCompleted {
            call_id: result.tool_call_id.clone(),
            success: result.succeeded(),
            result: result.result.clone(),
            error: result.error.clone(),
        })
        .await?;

        state.push(Turn::tool_result(&result));
    }

    Ok(())
}
