mod builder;
mod state;

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quill_actor::Actor;
use quill_model::ThinkingLevel;
use tokio::sync::{mpsc, oneshot};

use crate::conversation::Conversation;
use crate::events::{AgentEvent, AgentStopped, PromptError};
use crate::model_client::ModelClient;
use crate::observer::{Observer, Observers, Subscribe, Subscription};
use crate::tool::Executor as ToolExecutor;
pub use builder::{AgentBuilder, DEFAULT_MAX_ROUNDS};
use state::{
    Abort, ClearHistory, EnqueuePrompt, SetSystemPrompt, SetThinkingLevel,
    Turn, WaitForIdle,
};

/// What an agent is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AgentStage {
    /// No turn is running.
    #[default]
    Idle,
    /// A request was sent and no event has arrived yet.
    AwaitingBackend,
    /// The model is streaming a message.
    Streaming,
    /// Tools requested by the model are running.
    RunningTools,
}

/// A point-in-time copy of an agent's state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSnapshot {
    /// The current stage.
    pub stage: AgentStage,
    /// The system prompt used for the next request.
    pub system_prompt: String,
    /// The thinking level used for the next request.
    pub thinking_level: ThinkingLevel,
    /// The conversation history.
    pub conversation: Conversation,
    /// Prompts waiting for the current turn to finish.
    pub queued_prompts: usize,
    /// Number of registered observers, including channels.
    pub observers: usize,
}

/// The state owned by the agent's actor task.
///
/// Messages dispatched to the agent are handled immediately, no matter
/// what stage the agent is in. For example, a prompt sent while a turn is
/// running is queued and started once the agent becomes idle.
pub(crate) struct AgentState {
    pub(crate) model_client: ModelClient,
    pub(crate) tool_executor: ToolExecutor,
    pub(crate) system_prompt: String,
    pub(crate) thinking_level: ThinkingLevel,
    pub(crate) max_rounds: usize,
    pub(crate) conversation: Conversation,
    pub(crate) observers: Observers,
    pub(crate) stage: AgentStage,
    pub(crate) current_turn: Option<Turn>,
    pub(crate) pending_prompts: VecDeque<EnqueuePrompt>,
    pub(crate) idle_waiters: Vec<oneshot::Sender<()>>,
    pub(crate) clear_history_on_idle: bool,
    pub(crate) next_turn_id: u64,
}

impl AgentState {
    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            stage: self.stage,
            system_prompt: self.system_prompt.clone(),
            thinking_level: self.thinking_level,
            conversation: self.conversation.clone(),
            queued_prompts: self.pending_prompts.len(),
            observers: self.observers.len(),
        }
    }
}

/// An agent instance, which maintains a conversation, a model provider,
/// tools, and observers.
///
/// The handle is cheap to clone. The agent keeps running until every
/// handle is dropped and its in-flight work has finished.
#[derive(Clone)]
pub struct Agent {
    actor: Actor<AgentState>,
    next_subscription_id: Arc<AtomicU64>,
}

impl Agent {
    fn spawn_from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            system_prompt,
            thinking_level,
            max_rounds,
            tools,
        } = builder;

        debug!(
            "spawning an agent for {} with {} tools",
            model_client.model_id(),
            tools.len()
        );
        let state = AgentState {
            model_client,
            tool_executor: ToolExecutor::with_tools(tools),
            system_prompt,
            thinking_level,
            max_rounds,
            conversation: Default::default(),
            observers: Default::default(),
            stage: Default::default(),
            current_turn: None,
            pending_prompts: Default::default(),
            idle_waiters: Default::default(),
            clear_history_on_idle: false,
            next_turn_id: 1,
        };
        Self {
            actor: Actor::spawn(state, Some("agent")),
            next_subscription_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn add_observer(&self, observer: Observer) -> Subscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        if self.actor.send(Subscribe(id, observer)).is_err() {
            warn!("subscribing to an agent that has stopped");
        }
        Subscription::new(id, self.actor.downgrade())
    }

    /// Registers an observer that is invoked for every event.
    ///
    /// Observers run on the agent's task, one event at a time, in
    /// registration order. A slow observer delays later events, and a
    /// panicking one is logged and skipped without affecting the others.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.add_observer(Observer::Callback(Box::new(observer)))
    }

    /// Registers a channel that receives every event.
    ///
    /// Events of a turn are all queued before its [`Agent::prompt`]
    /// resolves.
    pub fn subscribe_channel(
        &self,
    ) -> (Subscription, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.add_observer(Observer::Channel(tx)), rx)
    }

    /// Sends a prompt and waits for its turn to end.
    ///
    /// The prompt is enqueued when this method is called, not when the
    /// returned future is first polled, so prompts start in call order.
    /// The future resolves after the turn's [`AgentEvent::AgentEnd`] has
    /// been delivered to every observer.
    ///
    /// Dropping the future does not cancel the turn, use
    /// [`Agent::abort`] for that.
    pub fn prompt<S: Into<String>>(
        &self,
        text: S,
    ) -> impl Future<Output = Result<(), PromptError>> + Send + 'static {
        let (done_tx, done_rx) = oneshot::channel();
        let sent = self.actor.send(EnqueuePrompt {
            text: text.into(),
            done_tx,
        });
        async move {
            sent.map_err(|_| PromptError::AgentStopped)?;
            done_rx.await.unwrap_or(Err(PromptError::AgentStopped))
        }
    }

    /// Aborts the running turn, if any.
    ///
    /// The turn ends with an [`AgentError::Aborted`](crate::AgentError)
    /// event and its prompt fails with [`PromptError::Aborted`]. Queued
    /// prompts are not affected.
    pub fn abort(&self) -> Result<(), AgentStopped> {
        self.actor.send(Abort).map_err(|_| AgentStopped)
    }

    /// Waits until no turn is running or queued.
    pub async fn wait_for_idle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.actor.send(WaitForIdle(tx)).is_ok() {
            rx.await.ok();
        }
    }

    /// Returns a copy of the agent's current state.
    pub async fn snapshot(&self) -> Result<AgentSnapshot, AgentStopped> {
        self.actor
            .query(|state| state.snapshot())
            .await
            .map_err(|_| AgentStopped)
    }

    /// Replaces the system prompt, starting from the next request.
    pub fn set_system_prompt<S: Into<String>>(
        &self,
        system_prompt: S,
    ) -> Result<(), AgentStopped> {
        self.actor
            .send(SetSystemPrompt(system_prompt.into()))
            .map_err(|_| AgentStopped)
    }

    /// Replaces the thinking level, starting from the next request.
    pub fn set_thinking_level(
        &self,
        level: ThinkingLevel,
    ) -> Result<(), AgentStopped> {
        self.actor
            .send(SetThinkingLevel(level))
            .map_err(|_| AgentStopped)
    }

    /// Forgets the conversation history.
    ///
    /// If a turn is running, the history is cleared when the agent
    /// becomes idle, before the next queued prompt starts.
    pub fn clear_history(&self) -> Result<(), AgentStopped> {
        self.actor.send(ClearHistory).map_err(|_| AgentStopped)
    }
}

impl Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent").finish_non_exhaustive()
    }
}
