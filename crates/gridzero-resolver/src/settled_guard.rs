//! Settled-round guard: this process never submits a second settlement for
//! a round it already committed.
//!
//! The ledger rejects duplicates on its own, but a lagging read replica can
//! report a round as unresolved right after we resolved it. The guard
//! short-circuits those cycles before any proof work is spent.
//!
//! The ledger only settles its current round, so round ids settle in
//! ascending order. That lets the guard stay bounded: evicted ids fold into
//! a low-water mark and still read as settled.

use std::collections::{BTreeSet, VecDeque};

use gridzero_types::{GridzeroError, Result, RoundId};

/// Bounded record of round ids this process saw settled.
#[derive(Debug)]
pub struct SettledRoundGuard {
    recent: BTreeSet<RoundId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<RoundId>,
    /// Every round at or below this id is settled.
    settled_through: Option<RoundId>,
    max_size: usize,
}

impl SettledRoundGuard {
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "SettledRoundGuard max_size must be > 0");
        Self {
            recent: BTreeSet::new(),
            order: VecDeque::with_capacity(max_size),
            settled_through: None,
            max_size,
        }
    }

    /// Record `round_id` as settled.
    ///
    /// # Errors
    /// [`GridzeroError::RoundAlreadySettled`] if it is already known settled.
    pub fn mark_settled(&mut self, round_id: RoundId) -> Result<()> {
        if self.is_settled(round_id) {
            return Err(GridzeroError::RoundAlreadySettled(round_id));
        }
        if self.recent.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.recent.remove(&oldest);
                self.settled_through = self.settled_through.max(Some(oldest));
            }
        }
        self.recent.insert(round_id);
        self.order.push_back(round_id);
        Ok(())
    }

    pub fn is_settled(&self, round_id: RoundId) -> bool {
        self.settled_through.is_some_and(|through| round_id <= through)
            || self.recent.contains(&round_id)
    }

    /// Highest round id recorded, if any.
    pub fn latest(&self) -> Option<RoundId> {
        self.recent.last().copied().max(self.settled_through)
    }

    /// Ids held individually (the low-water mark is not counted).
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.settled_through.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mark_ok() {
        let mut guard = SettledRoundGuard::new(8);
        guard.mark_settled(RoundId(1)).unwrap();
        assert!(guard.is_settled(RoundId(1)));
        assert!(!guard.is_settled(RoundId(2)));
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.latest(), Some(RoundId(1)));
    }

    #[test]
    fn second_mark_rejected() {
        let mut guard = SettledRoundGuard::new(8);
        guard.mark_settled(RoundId(7)).unwrap();
        let err = guard.mark_settled(RoundId(7)).unwrap_err();
        assert!(
            matches!(err, GridzeroError::RoundAlreadySettled(RoundId(7))),
            "Expected RoundAlreadySettled, got: {err:?}"
        );
    }

    #[test]
    fn evicted_rounds_stay_settled() {
        let mut guard = SettledRoundGuard::new(3);
        for id in 1..=5 {
            guard.mark_settled(RoundId(id)).unwrap();
        }
        assert_eq!(guard.len(), 3);
        for id in 1..=5 {
            assert!(guard.is_settled(RoundId(id)), "round {id}");
        }
        assert!(!guard.is_settled(RoundId(6)));
        assert!(guard.mark_settled(RoundId(1)).is_err());
        assert_eq!(guard.latest(), Some(RoundId(5)));
    }

    #[test]
    fn gaps_below_the_recent_window_are_not_settled() {
        let mut guard = SettledRoundGuard::new(4);
        guard.mark_settled(RoundId(10)).unwrap();
        guard.mark_settled(RoundId(12)).unwrap();
        assert!(!guard.is_settled(RoundId(11)));
        assert!(!guard.is_settled(RoundId(9)));
    }

    #[test]
    fn empty_guard() {
        let guard = SettledRoundGuard::new(4);
        assert!(guard.is_empty());
        assert!(!guard.is_settled(RoundId(1)));
        assert_eq!(guard.latest(), None);
    }

    #[test]
    #[should_panic(expected = "max_size must be > 0")]
    fn zero_max_size_panics() {
        let _ = SettledRoundGuard::new(0);
    }
}
