//! Events emitted by an agent while it handles prompts.

use quill_model::{
    AssistantMessage, ErrorKind, ModelFinishReason, ToolCallRequest,
};
use thiserror::Error;

use crate::tool::ToolResult;

/// A lifecycle event of an agent turn.
///
/// Every turn starts with [`AgentEvent::AgentStart`] and ends with exactly
/// one [`AgentEvent::AgentEnd`]. Events of different turns never
/// interleave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentEvent {
    /// A turn has started.
    AgentStart,
    /// A model round has started. Rounds are numbered from 1.
    TurnStart {
        /// The round number within the turn.
        round: usize,
    },
    /// The model started streaming a message.
    MessageStart,
    /// The streaming message has changed.
    MessageUpdate(AssistantMessageEvent),
    /// The model finished the message.
    MessageEnd {
        /// The complete message.
        message: AssistantMessage,
    },
    /// A tool requested by the model is about to run.
    ToolExecutionStart {
        /// The tool call request.
        call: ToolCallRequest,
    },
    /// A tool has finished.
    ToolExecutionEnd {
        /// The id of the tool call.
        id: String,
        /// What the tool returned.
        result: ToolResult,
    },
    /// The turn failed. Always followed by [`AgentEvent::AgentEnd`].
    Error(AgentError),
    /// The turn has ended. No further events follow for this turn.
    AgentEnd {
        /// How the turn ended.
        outcome: TurnOutcome,
    },
}

impl AgentEvent {
    /// Returns `true` if this is the terminal event of a turn.
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, AgentEvent::AgentEnd { .. })
    }
}

/// A content event of the message being streamed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssistantMessageEvent {
    /// A fragment of the response text.
    TextDelta {
        /// The text fragment.
        delta: String,
    },
    /// A fragment of the model's reasoning.
    ThinkingDelta {
        /// The reasoning fragment.
        delta: String,
    },
    /// The model requested a tool call.
    ToolCall {
        /// The complete tool call request.
        call: ToolCallRequest,
    },
    /// The model finished generating.
    Done {
        /// Why the model stopped.
        reason: ModelFinishReason,
    },
}

/// How a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnOutcome {
    /// The model produced its final answer.
    Completed,
    /// The turn was stopped by an error or an abort.
    Failed,
}

/// Why a turn failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The model provider reported an error.
    #[error("{message}")]
    Backend {
        /// The kind of the provider error.
        kind: ErrorKind,
        /// The provider's message.
        message: String,
    },
    /// The turn was aborted by the user.
    #[error("the turn was aborted")]
    Aborted,
    /// The model kept requesting tools past the round limit.
    #[error("the model requested more than {limit} rounds")]
    TooManyRounds {
        /// The configured limit.
        limit: usize,
    },
}

/// The error returned by [`Agent::prompt`](crate::Agent::prompt).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PromptError {
    /// The model provider reported an error.
    #[error("backend error ({kind}): {message}")]
    Backend {
        /// The kind of the provider error.
        kind: ErrorKind,
        /// The provider's message.
        message: String,
    },
    /// The turn was aborted.
    #[error("the turn was aborted")]
    Aborted,
    /// The model kept requesting tools past the round limit.
    #[error("the model requested more than {limit} rounds")]
    TooManyRounds {
        /// The configured limit.
        limit: usize,
    },
    /// The agent is no longer running.
    #[error("the agent has stopped")]
    AgentStopped,
}

impl From<AgentError> for PromptError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Backend { kind, message } => {
                PromptError::Backend { kind, message }
            }
            AgentError::Aborted => PromptError::Aborted,
            AgentError::TooManyRounds { limit } => {
                PromptError::TooManyRounds { limit }
            }
        }
    }
}

/// The error returned when talking to an agent that is no longer running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("the agent has stopped")]
pub struct AgentStopped;
