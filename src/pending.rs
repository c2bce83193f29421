//! One-shot results from asynchronous collaborators.
//!
//! Device acquisition, player buffering, and speech synthesis all complete
//! later than the call that started them. Hosts hand back a [`Pending`] and
//! fulfil it through the paired [`Resolver`]; the coordinator polls it from
//! its event loop and can cancel it at any time without waiting.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag the host can check before doing expensive work.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of a non-blocking check on a [`Pending`].
#[derive(Debug, PartialEq, Eq)]
pub enum PendingPoll<T> {
    Ready(T),
    Waiting,
    /// The resolver was dropped without producing a value.
    Abandoned,
}

/// Consumer side of a one-shot result.
pub struct Pending<T> {
    receiver: Receiver<T>,
    cancel: CancelToken,
}

/// Producer side of a one-shot result, held by the host.
pub struct Resolver<T> {
    sender: Sender<T>,
    cancel: CancelToken,
}

/// Create a linked resolver/pending pair.
pub fn pending<T>() -> (Resolver<T>, Pending<T>) {
    let (sender, receiver) = bounded(1);
    let cancel = CancelToken::new();
    (
        Resolver {
            sender,
            cancel: cancel.clone(),
        },
        Pending { receiver, cancel },
    )
}

impl<T> Pending<T> {
    /// A pending that has already resolved.
    pub fn ready(value: T) -> Self {
        let (resolver, pending) = pending();
        // The receiver is alive and the slot is empty, so this cannot fail.
        let _ = resolver.resolve(value);
        pending
    }

    pub fn poll(&self) -> PendingPoll<T> {
        match self.receiver.try_recv() {
            Ok(value) => PendingPoll::Ready(value),
            Err(TryRecvError::Empty) => PendingPoll::Waiting,
            Err(TryRecvError::Disconnected) => PendingPoll::Abandoned,
        }
    }

    /// Signal the host that the result is no longer wanted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Resolver<T> {
    /// Deliver the result. When the consumer already went away the value is
    /// handed back so the host can release whatever resource it holds.
    pub fn resolve(self, value: T) -> Result<(), T> {
        self.sender.try_send(value).map_err(|err| err.into_inner())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// Pendings whose result is no longer wanted but whose resource must still be
/// released the moment it shows up.
pub struct Orphanage<T> {
    orphans: Vec<Pending<T>>,
}

impl<T> Orphanage<T> {
    pub fn new() -> Self {
        Self {
            orphans: Vec::new(),
        }
    }

    pub fn adopt(&mut self, pending: Pending<T>) {
        pending.cancel();
        self.orphans.push(pending);
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    /// Hand every orphan that resolved since the last call to `release`.
    /// Returns how many were released.
    pub fn reap(&mut self, mut release: impl FnMut(T)) -> usize {
        let mut released = 0;
        self.orphans.retain(|pending| match pending.poll() {
            PendingPoll::Ready(value) => {
                release(value);
                released += 1;
                false
            }
            PendingPoll::Waiting => true,
            PendingPoll::Abandoned => false,
        });
        released
    }
}

impl<T> Default for Orphanage<T> {
    fn default() -> Self {
        Self::new()
    }
}
