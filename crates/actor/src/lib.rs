//! A lightweight actor framework.
//!
//! An actor owns a piece of state on its own Tokio task. Other tasks talk
//! to it only by sending [`Message`]s through an [`Actor`] handle, so the
//! state never needs a lock.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod mailbox;
mod scheduler;

pub use error::ActorDeadError;
pub use handle::{Actor, WeakActor};
pub use mailbox::Message;
