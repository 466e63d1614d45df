//! [`ChannelPublisher`]: the concrete [`Publisher`] adapter.
//!
//! Follows the same shape as the teacher's unified event channel — a single
//! `tokio::sync::mpsc::UnboundedSender` cloned into every producer, with one
//! receiver owned by whoever is watching for changeset notifications (here,
//! nothing in-process consumes it yet; external callers subscribe over
//! whatever transport wraps this binary). Unbounded is appropriate for the
//! same reason the teacher gives: producers emit at a bounded rate (one
//! notification per `calculate_remaining` pass) and are never blocked on a
//! slow consumer.

use diffengine_core::ports::Publisher;
use tokio::sync::mpsc;

/// One notification a changeset's job group can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangesetNotification {
    Monitor(i64),
    Update(i64),
    Forget(i64),
}

pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<ChangesetNotification>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangesetNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn monitor_changeset(&self, changeset: i64) {
        let _ = self.tx.send(ChangesetNotification::Monitor(changeset));
    }

    fn update_changeset(&self, changeset: i64) {
        let _ = self.tx.send(ChangesetNotification::Update(changeset));
    }

    fn forget_changeset(&self, changeset: i64) {
        let _ = self.tx.send(ChangesetNotification::Forget(changeset));
    }
}
