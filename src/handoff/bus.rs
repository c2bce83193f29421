//! Broadcast of restore signals to every feed view of one app.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use super::{PostId, ViewId};
use crate::lock_or_recover;

/// "Resume this post inline at this position."
///
/// Only the feed whose view is `source_view_id` acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSignal {
    pub post_id: PostId,
    pub source_view_id: ViewId,
    pub position_ms: u64,
}

#[derive(Default)]
pub struct RestoreBus {
    subscribers: Mutex<Vec<Sender<RestoreSignal>>>,
}

/// One listener's queue of signals.
pub struct RestoreSubscription {
    receiver: Receiver<RestoreSignal>,
}

impl RestoreSubscription {
    /// Every signal published since the last drain, oldest first.
    pub fn drain(&self) -> Vec<RestoreSignal> {
        self.receiver.try_iter().collect()
    }
}

impl RestoreBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> RestoreSubscription {
        let (sender, receiver) = unbounded();
        lock_or_recover(&self.subscribers, "RestoreBus::subscribe").push(sender);
        RestoreSubscription { receiver }
    }

    /// Deliver to every live subscriber; dropped subscriptions are pruned.
    /// Returns how many received the signal.
    pub fn publish(&self, signal: RestoreSignal) -> usize {
        let mut subscribers = lock_or_recover(&self.subscribers, "RestoreBus::publish");
        subscribers.retain(|sender| sender.send(signal.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.subscribers, "RestoreBus::subscriber_count").len()
    }
}
