use std::fmt::{self, Debug};
use std::panic::{AssertUnwindSafe, catch_unwind};

use quill_actor::{Actor, Message, WeakActor};
use tokio::sync::mpsc::UnboundedSender;

use crate::agent::AgentState;
use crate::events::AgentEvent;

pub(crate) type ObserverFn = Box<dyn Fn(&AgentEvent) + Send + Sync>;

pub(crate) enum Observer {
    Callback(ObserverFn),
    Channel(UnboundedSender<AgentEvent>),
}

/// Registered observers, in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    entries: Vec<(u64, Observer)>,
}

impl Observers {
    #[inline]
    pub fn add(&mut self, id: u64, observer: Observer) {
        self.entries.push((id, observer));
    }

    #[inline]
    pub fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Delivers `event` to every observer.
    ///
    /// A panicking callback is logged and skipped. Channels whose receiver
    /// is gone are dropped.
    pub fn dispatch(&mut self, event: &AgentEvent) {
        self.entries.retain(|(id, observer)| match observer {
            Observer::Callback(f) => {
                if catch_unwind(AssertUnwindSafe(|| f(event))).is_err() {
                    error!("observer {id} panicked while handling {event:?}");
                }
                true
            }
            Observer::Channel(tx) => {
                let alive = tx.send(event.clone()).is_ok();
                if !alive {
                    debug!("event channel {id} is closed, unsubscribing");
                }
                alive
            }
        });
    }
}

/// A registered observer.
///
/// Dropping the handle keeps the observer registered for the lifetime of
/// the agent; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    agent: WeakActor<AgentState>,
}

impl Subscription {
    #[inline]
    pub(crate) fn new(id: u64, agent: WeakActor<AgentState>) -> Self {
        Self { id, agent }
    }

    /// Removes the observer.
    ///
    /// Events emitted before this call is processed by the agent may
    /// still be delivered.
    pub fn unsubscribe(self) {
        if let Some(agent) = self.agent.upgrade() {
            agent.send(Unsubscribe(self.id)).ok();
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Subscribe(pub u64, pub Observer);

impl Debug for Subscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscribe").field(&self.0).finish_non_exhaustive()
    }
}

impl Message<AgentState> for Subscribe {
    #[inline]
    fn handle(self, state: &mut AgentState, _: &Actor<AgentState>) {
        state.observers.add(self.0, self.1);
    }
}

#[derive(Debug)]
struct Unsubscribe(u64);

impl Message<AgentState> for Unsubscribe {
    #[inline]
    fn handle(self, state: &mut AgentState, _: &Actor<AgentState>) {
        state.observers.remove(self.0);
    }
}
