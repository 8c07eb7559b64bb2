use std::sync::Weak;

use tokio::select;
use tokio::sync::{mpsc, watch};

use crate::Actor;
use crate::mailbox::{BoxedMessage, Mailbox};

pub(crate) async fn run_actor<S: Send + 'static>(
    mailbox: Weak<Mailbox<S>>,
    mut state: S,
    mut msg_rx: mpsc::UnboundedReceiver<BoxedMessage<S>>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("started");
    loop {
        let msg = select! {
            biased;

            _ = kill_rx.changed() => {
                debug!("killed");
                break;
            }
            msg = msg_rx.recv() => {
                let Some(msg) = msg else {
                    break;
                };
                msg
            }
        };
        trace!("received message: {msg:?}");

        // Handlers get a strong handle so they can send follow-up
        // messages, but we must not hold it across the next `recv`,
        // otherwise the actor would keep itself alive.
        let Some(mailbox) = mailbox.upgrade() else {
            warn!("last handle has been dropped, discard the message");
            break;
        };
        let handle = Actor::from_mailbox(mailbox);
        trace_span!("proc msg").in_scope(|| {
            msg.handle_box(&mut state, &handle);
        });
    }
    msg_rx.close();
    debug!("will terminate");
}
