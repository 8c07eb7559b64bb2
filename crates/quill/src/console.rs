use std::io::Write;
use std::sync::Mutex;

use quill_core::{AgentEvent, AssistantMessageEvent};

/// Printed once after the last text delta of a turn.
pub const DONE_TRAILER: &str = "\n\n--- done ---\n";

/// Whether `event` means the backend has answered, or the turn is over.
///
/// Lifecycle events emitted before the request goes out return `false`.
pub fn is_backend_activity(event: &AgentEvent) -> bool {
    matches!(
        event,
        AgentEvent::MessageStart
            | AgentEvent::MessageUpdate(_)
            | AgentEvent::MessageEnd { .. }
            | AgentEvent::Error(_)
            | AgentEvent::AgentEnd { .. }
    )
}

/// Returns an observer that writes text deltas to `out` as they arrive,
/// followed by [`DONE_TRAILER`] when the turn ends.
///
/// Output is flushed after every write. Write errors are logged and
/// otherwise ignored.
pub fn print_events<W>(out: W) -> impl Fn(&AgentEvent) + Send + Sync + 'static
where
    W: Write + Send + 'static,
{
    let out = Mutex::new(out);
    move |event| {
        let text = match event {
            AgentEvent::MessageUpdate(AssistantMessageEvent::TextDelta {
                delta,
            }) => delta.as_str(),
            AgentEvent::AgentEnd { .. } => DONE_TRAILER,
            _ => return,
        };
        let mut out = match out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = out.write_all(text.as_bytes()).and_then(|_| out.flush())
        {
            warn!("failed to write to the console: {err}");
        }
    }
}
