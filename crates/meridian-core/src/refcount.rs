//! Per-caller reference count tables.

use std::collections::HashMap;

use meridian_proto::{CallerZone, ErrorCode};
use parking_lot::Mutex;

/// Reference counts for one object, keyed by the zone holding each
/// reference.
///
/// Values change only through [`add`](Self::add) and
/// [`release`](Self::release) and are never observed partially: every
/// mutation happens under the table lock and reports the resulting totals
/// atomically.
#[derive(Debug, Default)]
pub struct CallerCounts {
    counts: Mutex<HashMap<CallerZone, u64>>,
}

impl CallerCounts {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table seeded with one reference held by `caller`.
    #[must_use]
    pub fn seeded(caller: CallerZone) -> Self {
        let table = Self::new();
        table.add(caller);
        table
    }

    /// Increments the count held by `caller` and returns the new total
    /// across all callers.
    pub fn add(&self, caller: CallerZone) -> u64 {
        let mut counts = self.counts.lock();
        *counts.entry(caller).or_insert(0) += 1;
        counts.values().sum()
    }

    /// Decrements the count held by `caller` and returns the new total
    /// across all callers.
    ///
    /// A release for a caller that holds no reference fails with
    /// `REFERENCE_COUNT_ERROR` and leaves the table untouched.
    pub fn release(&self, caller: CallerZone) -> Result<u64, ErrorCode> {
        let mut counts = self.counts.lock();
        match counts.get_mut(&caller) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&caller);
            }
            None => return Err(ErrorCode::ReferenceCountError),
        }
        Ok(counts.values().sum())
    }

    /// Returns the total count across all callers.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.lock().values().sum()
    }

    /// Returns the count held by one caller.
    #[must_use]
    pub fn held_by(&self, caller: CallerZone) -> u64 {
        self.counts.lock().get(&caller).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_release() {
        let counts = CallerCounts::new();
        assert_eq!(counts.add(CallerZone::new(1)), 1);
        assert_eq!(counts.add(CallerZone::new(2)), 2);
        assert_eq!(counts.add(CallerZone::new(1)), 3);

        assert_eq!(counts.release(CallerZone::new(1)).unwrap(), 2);
        assert_eq!(counts.release(CallerZone::new(2)).unwrap(), 1);
        assert_eq!(counts.release(CallerZone::new(1)).unwrap(), 0);
    }

    #[test]
    fn release_of_unknown_caller_is_rejected_without_mutation() {
        let counts = CallerCounts::seeded(CallerZone::new(1));

        let error = counts.release(CallerZone::new(9)).unwrap_err();
        assert_eq!(error, ErrorCode::ReferenceCountError);

        // The failed release must not have touched the table.
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.held_by(CallerZone::new(1)), 1);
    }

    #[test]
    fn double_release_is_rejected() {
        let counts = CallerCounts::seeded(CallerZone::new(3));
        assert_eq!(counts.release(CallerZone::new(3)).unwrap(), 0);
        assert_eq!(
            counts.release(CallerZone::new(3)).unwrap_err(),
            ErrorCode::ReferenceCountError
        );
    }

    #[test]
    fn per_caller_attribution() {
        let counts = CallerCounts::new();
        counts.add(CallerZone::new(4));
        counts.add(CallerZone::new(4));
        counts.add(CallerZone::new(5));

        assert_eq!(counts.held_by(CallerZone::new(4)), 2);
        assert_eq!(counts.held_by(CallerZone::new(5)), 1);
        assert_eq!(counts.held_by(CallerZone::new(6)), 0);
        assert_eq!(counts.total(), 3);
    }
}
