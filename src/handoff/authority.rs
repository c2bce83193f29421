use std::collections::HashMap;
use std::sync::Mutex;

use super::{PostId, ViewId};
use crate::lock_or_recover;

/// Who may play a post's video right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOwner {
    Inline(ViewId),
    Floating(u64),
}

/// Keeps a post from playing inline and in the mini-player at the same time.
#[derive(Debug, Default)]
pub struct PlayAuthority {
    owners: Mutex<HashMap<PostId, PlayOwner>>,
}

impl PlayAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, post: &PostId) -> Option<PlayOwner> {
        lock_or_recover(&self.owners, "PlayAuthority::owner")
            .get(post)
            .cloned()
    }

    pub fn is_floating(&self, post: &PostId) -> bool {
        matches!(self.owner(post), Some(PlayOwner::Floating(_)))
    }

    /// Refused while the post floats.
    pub fn claim_inline(&self, post: &PostId, view: &ViewId) -> bool {
        let mut owners = lock_or_recover(&self.owners, "PlayAuthority::claim_inline");
        if matches!(owners.get(post), Some(PlayOwner::Floating(_))) {
            return false;
        }
        owners.insert(post.clone(), PlayOwner::Inline(view.clone()));
        true
    }

    pub fn release_inline(&self, post: &PostId, view: &ViewId) {
        let mut owners = lock_or_recover(&self.owners, "PlayAuthority::release_inline");
        if owners.get(post) == Some(&PlayOwner::Inline(view.clone())) {
            owners.remove(post);
        }
    }

    /// The mini-player always wins; the inline owner must already be paused.
    pub fn claim_floating(&self, post: &PostId, session_id: u64) {
        lock_or_recover(&self.owners, "PlayAuthority::claim_floating")
            .insert(post.clone(), PlayOwner::Floating(session_id));
    }

    pub fn release_floating(&self, post: &PostId, session_id: u64) {
        let mut owners = lock_or_recover(&self.owners, "PlayAuthority::release_floating");
        if owners.get(post) == Some(&PlayOwner::Floating(session_id)) {
            owners.remove(post);
        }
    }
}
