use crate::models::{OrderId, OrderStatus};

/// Lifecycle of the single position allowed per instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    /// No position and no entry in flight
    Flat,
    /// Bracket submitted, acknowledgment pending
    Entering { is_long: bool },
    /// Entry acknowledged; `main_order_id` identifies the entry order
    InPosition { main_order_id: OrderId, is_long: bool },
}

/// How a fill relates to the tracked position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillClass {
    /// The entry order's own fill
    Entry,
    /// Any other order while in position: a protective leg closed it
    Exit,
    /// Nothing is being tracked
    Untracked,
}

/// Per-instrument position state machine
#[derive(Debug, Clone)]
pub struct PositionTracker {
    state: PositionState,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            state: PositionState::Flat,
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    pub fn is_entering(&self) -> bool {
        matches!(self.state, PositionState::Entering { .. })
    }

    pub fn main_order_id(&self) -> Option<OrderId> {
        match self.state {
            PositionState::InPosition { main_order_id, .. } => Some(main_order_id),
            _ => None,
        }
    }

    /// `Flat -> Entering`. Returns false, leaving state untouched, otherwise.
    pub fn try_begin_entry(&mut self, is_long: bool) -> bool {
        if !self.is_flat() {
            return false;
        }
        self.state = PositionState::Entering { is_long };
        true
    }

    /// `Entering -> InPosition` with the acknowledged order id
    ///
    /// Filled and resting acknowledgments are treated the same. Returns the
    /// recorded id, or `None` if no entry was in flight.
    pub fn confirm_entry(&mut self, status: &OrderStatus) -> Option<OrderId> {
        let PositionState::Entering { is_long } = self.state else {
            return None;
        };
        let main_order_id = status.order_id();
        self.state = PositionState::InPosition {
            main_order_id,
            is_long,
        };
        Some(main_order_id)
    }

    /// `Entering -> Flat` after a failed submission
    pub fn abort_entry(&mut self) -> bool {
        if !self.is_entering() {
            return false;
        }
        self.state = PositionState::Flat;
        true
    }

    pub fn classify_fill(&self, oid: OrderId) -> FillClass {
        match self.state {
            PositionState::InPosition { main_order_id, .. } if oid == main_order_id => FillClass::Entry,
            PositionState::InPosition { .. } => FillClass::Exit,
            _ => FillClass::Untracked,
        }
    }

    /// `InPosition -> Flat` once an exit has been accounted for
    pub fn close(&mut self) -> bool {
        if !matches!(self.state, PositionState::InPosition { .. }) {
            return false;
        }
        self.state = PositionState::Flat;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut tracker = PositionTracker::new();
        assert!(tracker.is_flat());

        assert!(tracker.try_begin_entry(true));
        assert_eq!(tracker.state(), PositionState::Entering { is_long: true });

        assert_eq!(tracker.confirm_entry(&OrderStatus::Resting { oid: 42 }), Some(42));
        assert_eq!(
            tracker.state(),
            PositionState::InPosition {
                main_order_id: 42,
                is_long: true
            }
        );

        assert!(tracker.close());
        assert!(tracker.is_flat());
        assert_eq!(tracker.main_order_id(), None);
    }

    #[test]
    fn test_second_entry_rejected_while_entering_or_in_position() {
        let mut tracker = PositionTracker::new();
        assert!(tracker.try_begin_entry(false));
        assert!(!tracker.try_begin_entry(true));
        assert_eq!(tracker.state(), PositionState::Entering { is_long: false });

        tracker.confirm_entry(&OrderStatus::Resting { oid: 7 });
        assert!(!tracker.try_begin_entry(true));
        assert_eq!(tracker.main_order_id(), Some(7));
    }

    #[test]
    fn test_filled_acknowledgment_recorded_like_resting() {
        let mut tracker = PositionTracker::new();
        tracker.try_begin_entry(true);

        let oid = tracker.confirm_entry(&OrderStatus::Filled {
            oid: 99,
            avg_px: 2000.5,
        });

        assert_eq!(oid, Some(99));
        assert_eq!(tracker.classify_fill(99), FillClass::Entry);
    }

    #[test]
    fn test_abort_returns_to_flat() {
        let mut tracker = PositionTracker::new();
        tracker.try_begin_entry(true);

        assert!(tracker.abort_entry());
        assert!(tracker.is_flat());
        assert_eq!(tracker.main_order_id(), None);
        assert!(tracker.try_begin_entry(false));
    }

    #[test]
    fn test_transitions_from_wrong_state_are_noops() {
        let mut tracker = PositionTracker::new();
        assert_eq!(tracker.confirm_entry(&OrderStatus::Resting { oid: 1 }), None);
        assert!(!tracker.abort_entry());
        assert!(!tracker.close());
        assert!(tracker.is_flat());

        tracker.try_begin_entry(true);
        assert!(!tracker.close());
        tracker.confirm_entry(&OrderStatus::Resting { oid: 1 });
        assert!(!tracker.abort_entry());
        assert_eq!(tracker.main_order_id(), Some(1));
    }

    #[test]
    fn test_fill_classification() {
        let mut tracker = PositionTracker::new();
        assert_eq!(tracker.classify_fill(5), FillClass::Untracked);

        tracker.try_begin_entry(true);
        assert_eq!(tracker.classify_fill(5), FillClass::Untracked);

        tracker.confirm_entry(&OrderStatus::Resting { oid: 5 });
        assert_eq!(tracker.classify_fill(5), FillClass::Entry);
        assert_eq!(tracker.classify_fill(6), FillClass::Exit);
    }
}
