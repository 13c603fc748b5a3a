//! Sibling ordering.
//!
//! [`IndexManager`] hands out positions for newly created children, properties
//! and values; [`SortedKeyedIndex`] is the lazily loaded, ordered, keyed
//! collection that holds them.

pub mod sorted;

pub use sorted::{IndexSource, SortedKeyedIndex};

use crate::Result;

/// What an owner exposes about its backing rows without loading them.
pub trait BackingSource {
    /// The owner has never been persisted, so it has no backing rows.
    fn owner_is_transient(&self) -> bool;

    /// Number of backing rows owned by the owner.
    fn count_backing(&self) -> Result<u64>;
}

/// Sequential position allocator for one owner's children.
///
/// The first call fixes the counter: `0` for a transient owner, otherwise the
/// backing row count. Later calls post-increment it.
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    next: Option<u64>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_started<S: BackingSource + ?Sized>(&mut self, source: &S) -> Result<u64> {
        match self.next {
            Some(n) => Ok(n),
            None => {
                let start = if source.owner_is_transient() { 0 } else { source.count_backing()? };
                self.next = Some(start);
                Ok(start)
            }
        }
    }

    /// Allocate the next position.
    pub fn pull_next_child_index<S: BackingSource + ?Sized>(&mut self, source: &S) -> Result<u64> {
        let next = self.ensure_started(source)?;
        self.next = Some(next + 1);
        Ok(next)
    }

    /// Give back one slot after a sibling was removed.
    pub fn release<S: BackingSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let next = self.ensure_started(source)?;
        self.next = Some(next.saturating_sub(1));
        Ok(())
    }

    /// Make sure the next allocation lands after `index`.
    pub fn reserve_through<S: BackingSource + ?Sized>(&mut self, index: u64, source: &S) -> Result<()> {
        let next = self.ensure_started(source)?;
        if next <= index {
            self.next = Some(index + 1);
        }
        Ok(())
    }

    /// Current counter, if started.
    pub fn peek(&self) -> Option<u64> {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fixed {
        transient: bool,
        rows: u64,
        queries: Cell<u32>,
    }

    impl BackingSource for Fixed {
        fn owner_is_transient(&self) -> bool {
            self.transient
        }

        fn count_backing(&self) -> Result<u64> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.rows)
        }
    }

    #[test]
    fn test_transient_owner_starts_at_zero() {
        let src = Fixed { transient: true, rows: 7, queries: Cell::new(0) };
        let mut m = IndexManager::new();
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 0);
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 1);
        assert_eq!(src.queries.get(), 0);
    }

    #[test]
    fn test_persisted_owner_counts_once() {
        let src = Fixed { transient: false, rows: 3, queries: Cell::new(0) };
        let mut m = IndexManager::new();
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 3);
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 4);
        assert_eq!(src.queries.get(), 1);
        assert_eq!(m.peek(), Some(5));
    }

    #[test]
    fn test_release_and_reserve() {
        let src = Fixed { transient: false, rows: 3, queries: Cell::new(0) };
        let mut m = IndexManager::new();
        m.release(&src).unwrap();
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 2);
        m.reserve_through(9, &src).unwrap();
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 10);
        m.reserve_through(4, &src).unwrap();
        assert_eq!(m.pull_next_child_index(&src).unwrap(), 11);
    }
}
