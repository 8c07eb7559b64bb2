//! An agent that answers a single prompt from the terminal.
//!
//! The crate includes a CLI for using in the terminal. The pieces it is
//! made of are exported as well, so that host apps can drive an agent the
//! same way.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod console;
mod settings;

pub use console::{DONE_TRAILER, is_backend_activity, print_events};
pub use settings::{
    DEFAULT_BACKEND, DEFAULT_MODEL, DEFAULT_PROMPT, DemoSettings,
    SYSTEM_PROMPT, build_agent,
};

/// Re-exports of [`quill_core`] crate.
pub mod core {
    pub use quill_core::*;
}

/// Re-exports of [`quill_model`] crate.
pub mod model {
    pub use quill_model::*;
}

/// Re-exports of [`quill_openai_model`] crate.
pub mod openai {
    pub use quill_openai_model::*;
}
