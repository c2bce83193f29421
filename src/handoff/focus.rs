use std::sync::Mutex;

use tracing::debug;

use super::ViewId;
use crate::lock_or_recover;

/// Which tab/view is in front.
#[derive(Debug, Default)]
pub struct ViewFocus {
    focused: Mutex<Option<ViewId>>,
}

impl ViewFocus {
    pub fn new(initial: Option<ViewId>) -> Self {
        Self {
            focused: Mutex::new(initial),
        }
    }

    pub fn focused(&self) -> Option<ViewId> {
        lock_or_recover(&self.focused, "ViewFocus::focused").clone()
    }

    pub fn is_focused(&self, view: &ViewId) -> bool {
        self.focused().as_ref() == Some(view)
    }

    /// Returns false when `view` already had focus.
    pub fn focus(&self, view: &ViewId) -> bool {
        let mut focused = lock_or_recover(&self.focused, "ViewFocus::focus");
        if focused.as_ref() == Some(view) {
            return false;
        }
        debug!(view = %view, "view focused");
        *focused = Some(view.clone());
        true
    }
}
