//! Process-wide exclusive microphone lease.
//!
//! Only one composer may hold the microphone. The slot owns the live device
//! handle itself, so a new claim can release the previous holder's device
//! synchronously even when that holder belongs to another view.

use std::sync::Mutex;

use crate::capabilities::{MicStream, RecognitionStream};
use crate::gesture::ComposerId;
use crate::{lock_or_recover, log_debug};

/// Proof of a claim. Stale tickets are rejected by every slot operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseTicket(u64);

impl LeaseTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Device handle parked in the slot while a session uses the microphone.
pub enum MicHandle {
    Recording(Box<dyn MicStream>),
    Dictation(Box<dyn RecognitionStream>),
}

impl MicHandle {
    pub fn release(self) {
        match self {
            MicHandle::Recording(stream) => stream.release(),
            MicHandle::Dictation(stream) => stream.stop(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MicHandle::Recording(_) => "recording",
            MicHandle::Dictation(_) => "dictation",
        }
    }
}

struct Holder {
    owner: ComposerId,
    ticket: LeaseTicket,
    handle: Option<MicHandle>,
}

#[derive(Default)]
struct SlotState {
    holder: Option<Holder>,
    next_ticket: u64,
}

#[derive(Default)]
pub struct MicrophoneSlot {
    state: Mutex<SlotState>,
}

impl MicrophoneSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the microphone for `owner`, releasing whatever the previous holder
    /// had parked. The released handle is freed before this returns.
    pub fn claim(&self, owner: &ComposerId) -> LeaseTicket {
        let (ticket, evicted) = {
            let mut state = lock_or_recover(&self.state, "MicrophoneSlot::claim");
            state.next_ticket += 1;
            let ticket = LeaseTicket(state.next_ticket);
            let evicted = state.holder.replace(Holder {
                owner: owner.clone(),
                ticket,
                handle: None,
            });
            (ticket, evicted)
        };
        if let Some(previous) = evicted {
            log_debug(&format!(
                "mic: {} supersedes {} (ticket {})",
                owner,
                previous.owner,
                previous.ticket.value()
            ));
            if let Some(handle) = previous.handle {
                handle.release();
            }
        }
        ticket
    }

    /// Park the device for a live lease. A stale ticket gets the handle back
    /// so the caller can release it immediately.
    pub fn install(&self, ticket: LeaseTicket, handle: MicHandle) -> Result<(), MicHandle> {
        let mut state = lock_or_recover(&self.state, "MicrophoneSlot::install");
        match state.holder.as_mut() {
            Some(holder) if holder.ticket == ticket => {
                holder.handle = Some(handle);
                Ok(())
            }
            _ => Err(handle),
        }
    }

    pub fn is_current(&self, ticket: LeaseTicket) -> bool {
        let state = lock_or_recover(&self.state, "MicrophoneSlot::is_current");
        state
            .holder
            .as_ref()
            .is_some_and(|holder| holder.ticket == ticket)
    }

    pub fn holder(&self) -> Option<ComposerId> {
        let state = lock_or_recover(&self.state, "MicrophoneSlot::holder");
        state.holder.as_ref().map(|holder| holder.owner.clone())
    }

    /// Run `f` against the parked handle of a live lease.
    pub fn with_handle<R>(
        &self,
        ticket: LeaseTicket,
        f: impl FnOnce(&mut MicHandle) -> R,
    ) -> Option<R> {
        let mut state = lock_or_recover(&self.state, "MicrophoneSlot::with_handle");
        let holder = state.holder.as_mut()?;
        if holder.ticket != ticket {
            return None;
        }
        holder.handle.as_mut().map(f)
    }

    /// End the lease and hand the parked device to the caller.
    pub fn take(&self, ticket: LeaseTicket) -> Option<MicHandle> {
        let mut state = lock_or_recover(&self.state, "MicrophoneSlot::take");
        if state
            .holder
            .as_ref()
            .is_some_and(|holder| holder.ticket == ticket)
        {
            state.holder.take().and_then(|holder| holder.handle)
        } else {
            None
        }
    }

    /// End the lease and free the parked device, if any.
    pub fn release(&self, ticket: LeaseTicket) -> bool {
        match self.take(ticket) {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }
}
