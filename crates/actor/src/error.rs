use thiserror::Error;

/// A type of error which can be returned whenever messages are sent to
/// an actor that has stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("the actor has stopped")]
pub struct ActorDeadError;
