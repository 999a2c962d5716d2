//! Thread-safe member slot for shared handles.

use std::sync::Arc;

use parking_lot::RwLock;

/// A reader-writer-protected slot holding a reference-counted handle.
///
/// Readers copy the handle out under a shared lock and then operate on the
/// local copy without holding the lock, so release paths can never race a
/// holder on the slot itself; the lifetime of whatever a reader obtained is
/// carried by the `Arc` on the local copy. Writers (assignment, reset) take
/// the exclusive lock.
#[derive(Debug)]
pub struct MemberCell<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> MemberCell<T> {
    /// Creates an empty cell.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Creates a cell holding the given handle.
    #[must_use]
    pub fn new(value: Arc<T>) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }

    /// Returns a local copy of the handle, if any.
    #[must_use]
    pub fn get_nullable(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    /// Stores a new handle, dropping the previous one.
    pub fn set(&self, value: Arc<T>) {
        *self.slot.write() = Some(value);
    }

    /// Clears the slot.
    pub fn reset(&self) {
        self.slot.write().take();
    }

    /// Clears the slot and returns the previous handle, if any.
    pub fn take(&self) -> Option<Arc<T>> {
        self.slot.write().take()
    }

    /// Checks whether the slot currently holds a handle.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl<T> Default for MemberCell<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_reads_none() {
        let cell: MemberCell<u32> = MemberCell::empty();
        assert!(cell.get_nullable().is_none());
        assert!(!cell.is_set());
    }

    #[test]
    fn set_and_reset() {
        let cell = MemberCell::empty();
        cell.set(Arc::new(41));

        assert_eq!(cell.get_nullable().as_deref(), Some(&41));
        assert!(cell.is_set());

        cell.reset();
        assert!(cell.get_nullable().is_none());
    }

    #[test]
    fn readers_keep_their_copy_across_a_reset() {
        let cell = MemberCell::new(Arc::new(String::from("held")));

        let copy = cell.get_nullable().unwrap();
        cell.reset();

        // The slot is gone but the local copy stays valid.
        assert_eq!(copy.as_str(), "held");
        assert!(cell.get_nullable().is_none());
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let cell = Arc::new(MemberCell::new(Arc::new(0u64)));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let cell = cell.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    if let Some(value) = cell.get_nullable() {
                        // Values only ever come from the writer below.
                        assert!(*value <= 100);
                    }
                }
            }));
        }

        for i in 1..=100 {
            cell.set(Arc::new(i));
        }
        cell.reset();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
