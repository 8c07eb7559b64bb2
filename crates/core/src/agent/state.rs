use std::mem;

use quill_actor::{Actor, Message};
use quill_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelRequest,
    ModelResponseEvent, ThinkingLevel, ToolCallRequest, ToolCallResult,
};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinError};
use tracing::Instrument;

use super::{AgentStage, AgentState};
use crate::events::{
    AgentError, AgentEvent, AssistantMessageEvent, PromptError, TurnOutcome,
};
use crate::model_client::ModelClientResponse;
use crate::tool::{Error as ToolError, ToolResult};

/// The prompt being handled.
///
/// The system prompt and thinking level are captured when the turn
/// starts, so changing them only affects later turns.
pub(crate) struct Turn {
    id: u64,
    round: usize,
    system_prompt: String,
    thinking_level: ThinkingLevel,
    done_tx: oneshot::Sender<Result<(), PromptError>>,
    tasks: Vec<AbortHandle>,
    tool_calls: Vec<ToolSlot>,
}

struct ToolSlot {
    call: ToolCallRequest,
    result: Option<ToolResult>,
}

impl AgentState {
    #[inline]
    fn emit(&mut self, event: AgentEvent) {
        trace!("emitting {event:?}");
        self.observers.dispatch(&event);
    }

    #[inline]
    fn is_current_turn(&self, turn_id: u64) -> bool {
        self.current_turn.as_ref().is_some_and(|turn| turn.id == turn_id)
    }

    fn enqueue_prompt(&mut self, prompt: EnqueuePrompt, handle: &Actor<Self>) {
        if self.current_turn.is_some() {
            // The prompt is started when the current turn ends.
            debug!("a turn is running, queueing the prompt");
            self.pending_prompts.push_back(prompt);
            return;
        }
        self.start_turn(prompt, handle);
    }

    fn start_turn(&mut self, prompt: EnqueuePrompt, handle: &Actor<Self>) {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        debug!("turn {id} started");

        self.current_turn = Some(Turn {
            id,
            round: 0,
            system_prompt: self.system_prompt.clone(),
            thinking_level: self.thinking_level,
            done_tx: prompt.done_tx,
            tasks: vec![],
            tool_calls: vec![],
        });
        self.conversation.push(ModelMessage::User(prompt.text));
        self.emit(AgentEvent::AgentStart);
        self.start_round(handle);
    }

    fn start_round(&mut self, handle: &Actor<Self>) {
        let max_rounds = self.max_rounds;
        let Some(turn) = &mut self.current_turn else {
            return;
        };
        if turn.round >= max_rounds {
            self.finish_turn(
                Err(AgentError::TooManyRounds { limit: max_rounds }),
                handle,
            );
            return;
        }
        turn.round += 1;
        turn.tasks.clear();
        let (turn_id, round) = (turn.id, turn.round);

        self.stage = AgentStage::AwaitingBackend;
        self.emit(AgentEvent::TurnStart { round });

        let request = self.build_model_request();
        let resp_fut = self.model_client.send_request(request, {
            let handle = handle.clone();
            move |event| {
                handle.send(ModelEventReceived { turn_id, event }).ok();
            }
        });
        let task = spawn_reporting(
            resp_fut.instrument(debug_span!("model round", turn_id, round)),
            handle,
            move |result| ModelRoundFinished {
                turn_id,
                result: match result {
                    Ok(Ok(resp)) => Ok(resp),
                    Ok(Err(err)) => Err(AgentError::Backend {
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                    Err(_) => Err(AgentError::Backend {
                        kind: ErrorKind::Other,
                        message: "the model request panicked".to_owned(),
                    }),
                },
            },
        );
        if let Some(turn) = &mut self.current_turn {
            turn.tasks.push(task);
        }
    }

    fn build_model_request(&self) -> ModelRequest {
        let Some(turn) = &self.current_turn else {
            return ModelRequest::default();
        };
        let mut messages = Vec::with_capacity(self.conversation.len() + 1);
        if !turn.system_prompt.is_empty() {
            messages.push(ModelMessage::System(turn.system_prompt.clone()));
        }
        messages.extend(self.conversation.messages().iter().cloned());
        ModelRequest {
            messages,
            tools: self.tool_executor.definitions(),
            thinking_level: turn.thinking_level,
        }
    }

    fn begin_message(&mut self) {
        if self.stage == AgentStage::AwaitingBackend {
            self.stage = AgentStage::Streaming;
            self.emit(AgentEvent::MessageStart);
        }
    }

    fn handle_model_event(&mut self, turn_id: u64, event: ModelResponseEvent) {
        if !self.is_current_turn(turn_id) {
            trace!("dropping an event of turn {turn_id}");
            return;
        }
        self.begin_message();
        let update = match event {
            ModelResponseEvent::MessageDelta(delta) => {
                AssistantMessageEvent::TextDelta { delta }
            }
            ModelResponseEvent::ReasoningDelta(delta) => {
                AssistantMessageEvent::ThinkingDelta { delta }
            }
            ModelResponseEvent::ToolCall(call) => {
                AssistantMessageEvent::ToolCall { call }
            }
            ModelResponseEvent::Completed(reason) => {
                AssistantMessageEvent::Done { reason }
            }
        };
        self.emit(AgentEvent::MessageUpdate(update));
    }

    fn handle_round_finished(
        &mut self,
        turn_id: u64,
        result: Result<ModelClientResponse, AgentError>,
        handle: &Actor<Self>,
    ) {
        if !self.is_current_turn(turn_id) {
            return;
        }
        let ModelClientResponse {
            message,
            finish_reason,
        } = match result {
            Ok(resp) => resp,
            Err(err) => {
                self.finish_turn(Err(err), handle);
                return;
            }
        };

        // A response may finish without streaming anything.
        self.begin_message();
        self.emit(AgentEvent::MessageEnd {
            message: message.clone(),
        });
        let tool_calls = message.tool_calls.clone();
        self.conversation.push(ModelMessage::Assistant(message));

        if tool_calls.is_empty() {
            if finish_reason == ModelFinishReason::Length {
                warn!("the response was cut off by the output token limit");
            }
            self.finish_turn(Ok(()), handle);
            return;
        }
        self.run_tools(turn_id, tool_calls, handle);
    }

    fn run_tools(
        &mut self,
        turn_id: u64,
        calls: Vec<ToolCallRequest>,
        handle: &Actor<Self>,
    ) {
        self.stage = AgentStage::RunningTools;
        for call in &calls {
            self.emit(AgentEvent::ToolExecutionStart { call: call.clone() });
        }

        let mut tasks = Vec::with_capacity(calls.len());
        self.tool_executor.handle_requests(&calls, |req, fut| {
            let id = req.id.clone();
            let span = debug_span!("tool execute", name = %req.name, id = %req.id);
            tasks.push(spawn_reporting(
                fut.instrument(span),
                handle,
                move |result| ToolFinished {
                    turn_id,
                    id,
                    result: result.unwrap_or_else(|_| {
                        Err(ToolError::execution_error()
                            .with_reason("the tool panicked"))
                    }),
                },
            ));
        });

        if let Some(turn) = &mut self.current_turn {
            turn.tasks.extend(tasks);
            turn.tool_calls = calls
                .into_iter()
                .map(|call| ToolSlot { call, result: None })
                .collect();
        }
    }

    fn handle_tool_finished(
        &mut self,
        turn_id: u64,
        id: String,
        result: ToolResult,
        handle: &Actor<Self>,
    ) {
        if !self.is_current_turn(turn_id) {
            return;
        }
        let Some(turn) = &mut self.current_turn else {
            return;
        };
        let Some(slot) = turn
            .tool_calls
            .iter_mut()
            .find(|slot| slot.call.id == id && slot.result.is_none())
        else {
            warn!("got a result for unknown tool call {id}");
            return;
        };
        slot.result = Some(result.clone());
        let all_done = turn.tool_calls.iter().all(|slot| slot.result.is_some());
        let slots = if all_done {
            mem::take(&mut turn.tool_calls)
        } else {
            vec![]
        };

        self.emit(AgentEvent::ToolExecutionEnd { id, result });
        if all_done {
            self.commit_tool_results(slots);
            self.start_round(handle);
        }
    }

    /// Appends tool results to the conversation, in request order.
    ///
    /// Calls without a result are recorded as cancelled, so every tool
    /// call in the history has an answer.
    fn commit_tool_results(&mut self, slots: Vec<ToolSlot>) {
        for ToolSlot { call, result } in slots {
            let result = result.unwrap_or_else(|| Err(ToolError::cancelled()));
            let (content, is_error) = match result {
                Ok(content) => (content, false),
                Err(err) => (err.to_string(), true),
            };
            self.conversation.push(ModelMessage::Tool(ToolCallResult {
                id: call.id,
                content,
                is_error,
            }));
        }
    }

    fn finish_turn(
        &mut self,
        result: Result<(), AgentError>,
        handle: &Actor<Self>,
    ) {
        let Some(turn) = self.current_turn.take() else {
            return;
        };
        for task in &turn.tasks {
            task.abort();
        }
        self.commit_tool_results(turn.tool_calls);
        self.stage = AgentStage::Idle;

        let outcome = match &result {
            Ok(()) => {
                debug!("turn {} completed after {} rounds", turn.id, turn.round);
                TurnOutcome::Completed
            }
            Err(err) => {
                warn!("turn {} failed: {err}", turn.id);
                self.emit(AgentEvent::Error(err.clone()));
                TurnOutcome::Failed
            }
        };
        self.emit(AgentEvent::AgentEnd { outcome });
        // The caller may have stopped waiting.
        turn.done_tx.send(result.map_err(PromptError::from)).ok();

        self.process_next_prompt(handle);
    }

    fn process_next_prompt(&mut self, handle: &Actor<Self>) {
        if self.clear_history_on_idle {
            self.clear_history_on_idle = false;
            self.conversation.clear();
        }
        if let Some(prompt) = self.pending_prompts.pop_front() {
            self.start_turn(prompt, handle);
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            waiter.send(()).ok();
        }
    }

    #[inline]
    fn is_idle(&self) -> bool {
        self.current_turn.is_none() && self.pending_prompts.is_empty()
    }
}

/// Spawns `fut` and sends the message built by `report` once it ends.
///
/// Nothing is reported when the task is aborted.
fn spawn_reporting<T, M, Fut, R>(
    fut: Fut,
    handle: &Actor<AgentState>,
    report: R,
) -> AbortHandle
where
    T: Send + 'static,
    M: Message<AgentState> + 'static,
    Fut: Future<Output = T> + Send + 'static,
    R: FnOnce(Result<T, JoinError>) -> M + Send + 'static,
{
    let task = tokio::spawn(fut);
    let abort_handle = task.abort_handle();
    let handle = handle.clone();
    tokio::spawn(async move {
        let result = task.await;
        if matches!(&result, Err(err) if err.is_cancelled()) {
            return;
        }
        if matches!(&result, Err(err) if err.is_panic()) {
            error!("a task of the agent panicked");
        }
        handle.send(report(result)).ok();
    });
    abort_handle
}

#[derive(Debug)]
pub(crate) struct EnqueuePrompt {
    pub text: String,
    pub done_tx: oneshot::Sender<Result<(), PromptError>>,
}

impl Message<AgentState> for EnqueuePrompt {
    #[inline]
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        state.enqueue_prompt(self, handle);
    }
}

#[derive(Debug)]
struct ModelEventReceived {
    turn_id: u64,
    event: ModelResponseEvent,
}

impl Message<AgentState> for ModelEventReceived {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        state.handle_model_event(self.turn_id, self.event);
    }
}

#[derive(Debug)]
struct ModelRoundFinished {
    turn_id: u64,
    result: Result<ModelClientResponse, AgentError>,
}

impl Message<AgentState> for ModelRoundFinished {
    #[inline]
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        state.handle_round_finished(self.turn_id, self.result, handle);
    }
}

#[derive(Debug)]
struct ToolFinished {
    turn_id: u64,
    id: String,
    result: ToolResult,
}

impl Message<AgentState> for ToolFinished {
    #[inline]
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        state.handle_tool_finished(self.turn_id, self.id, self.result, handle);
    }
}

#[derive(Debug)]
pub(crate) struct Abort;

impl Message<AgentState> for Abort {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        if state.current_turn.is_none() {
            debug!("nothing to abort");
            return;
        }
        state.finish_turn(Err(AgentError::Aborted), handle);
    }
}

#[derive(Debug)]
pub(crate) struct WaitForIdle(pub oneshot::Sender<()>);

impl Message<AgentState> for WaitForIdle {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        if state.is_idle() {
            self.0.send(()).ok();
        } else {
            state.idle_waiters.push(self.0);
        }
    }
}

#[derive(Debug)]
pub(crate) struct SetSystemPrompt(pub String);

impl Message<AgentState> for SetSystemPrompt {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        state.system_prompt = self.0;
    }
}

#[derive(Debug)]
pub(crate) struct SetThinkingLevel(pub ThinkingLevel);

impl Message<AgentState> for SetThinkingLevel {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        state.thinking_level = self.0;
    }
}

#[derive(Debug)]
pub(crate) struct ClearHistory;

impl Message<AgentState> for ClearHistory {
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        if state.current_turn.is_some() {
            state.clear_history_on_idle = true;
        } else {
            state.conversation.clear();
        }
    }
}
