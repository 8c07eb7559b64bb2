//! Core logic including the agent loop, events, observers and tool
//! execution.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod events;
mod model_client;
mod observer;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentSnapshot, AgentStage, DEFAULT_MAX_ROUNDS,
};
pub use events::{
    AgentError, AgentEvent, AgentStopped, AssistantMessageEvent, PromptError,
    TurnOutcome,
};
pub use observer::Subscription;
