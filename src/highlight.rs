//! Highlight coordination.
//!
//! One facility at most is emphasized at a time. List hover and marker hover both go
//! through [`HighlightCoordinator`], so the list and the map always agree on which
//! facility that is. The coordinator only decides *what* changes; the marker manager
//! applies the visual change to the markers it owns.

use log::debug;

use crate::FacilityId;

/// Visual change implied by a highlight transition.
///
/// `restore` goes back to baseline before `emphasize` is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HighlightChange {
    pub restore: Option<FacilityId>,
    pub emphasize: Option<FacilityId>,
}

impl HighlightChange {
    pub fn is_empty(&self) -> bool {
        self.restore.is_none() && self.emphasize.is_none()
    }
}

/// Single source of truth for the highlighted facility.
#[derive(Debug, Default)]
pub struct HighlightCoordinator {
    current: Option<FacilityId>,
}

impl HighlightCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<FacilityId> {
        self.current
    }

    pub fn is_highlighted(&self, id: FacilityId) -> bool {
        self.current == Some(id)
    }

    /// Highlight `id`, or clear the highlight with `None`.
    ///
    /// Setting the already highlighted id is a no-op.
    pub fn set_highlight(&mut self, id: Option<FacilityId>) -> HighlightChange {
        if self.current == id {
            return HighlightChange::default();
        }
        let change = HighlightChange {
            restore: self.current,
            emphasize: id,
        };
        self.current = id;
        debug!("[Highlight] {:?} -> {:?}", change.restore, change.emphasize);
        change
    }

    /// Mouse left `id`. Clears the highlight only if `id` is still the highlighted one,
    /// so a late leave event cannot clear a newer highlight.
    pub fn leave(&mut self, id: FacilityId) -> HighlightChange {
        if self.current != Some(id) {
            debug!("[Highlight] Ignoring stale leave for {} (current {:?})", id, self.current);
            return HighlightChange::default();
        }
        self.set_highlight(None)
    }

    /// Drop the highlight without a restore, for a facility whose marker is gone.
    pub fn forget(&mut self, id: FacilityId) -> bool {
        if self.current == Some(id) {
            self.current = None;
            true
        } else {
            false
        }
    }
}
