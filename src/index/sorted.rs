//! SortedKeyedIndex: a lazily loaded, ordered, uniquely keyed collection.
//!
//! One implementation serves node→children, node→properties and
//! property→values. The index only stores item handles; everything it needs to
//! know about an item (key, position, staging state, backing identity) and the
//! backing rows themselves come from an [`IndexSource`].
//!
//! Ordering is by each item's position. Sorting is deferred: mutations set a
//! flag and the sort (plus a rebuild of the key map) happens on the next read.

use std::fmt;
use std::hash::Hash;

use hashbrown::{HashMap, HashSet};

use crate::storage::{Record, RecordId};
use crate::{Error, Result};
use super::BackingSource;

/// Everything a [`SortedKeyedIndex`] needs from its owner.
pub trait IndexSource<K, H>: BackingSource {
    /// All backing rows of the owner, ordered by position.
    fn load_all(&mut self) -> Result<Vec<Record>>;

    /// The backing row with the given key, if any.
    fn load_one(&mut self, key: &K) -> Result<Option<Record>>;

    /// Key of a backing row.
    fn record_key(&self, record: &Record) -> Option<K>;

    /// Turn a backing row into a resident item.
    fn wrap(&mut self, record: Record) -> Result<H>;

    fn key_of(&self, item: H) -> K;

    /// Backing identity of a resident item; `None` while transient.
    fn record_id(&self, item: H) -> Option<RecordId>;

    fn position(&self, item: H) -> u64;

    /// Assign a new position and stage the item for persist.
    fn renumber(&mut self, item: H, position: u64);

    fn is_pending_removal(&self, item: H) -> bool;

    /// Precondition hook run before a move.
    fn check_move(&self, _item: H) -> Result<()> {
        Ok(())
    }
}

/// Ordered, keyed, lazily loaded collection of item handles.
#[derive(Debug, Clone)]
pub struct SortedKeyedIndex<K, H> {
    items: Vec<H>,
    keys: HashMap<K, H>,
    /// Persisted items superseded in memory whose rows are not deleted yet.
    retired: HashSet<RecordId>,
    loaded: bool,
    unsorted: bool,
}

impl<K, H> Default for SortedKeyedIndex<K, H> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            keys: HashMap::new(),
            retired: HashSet::new(),
            loaded: false,
            unsorted: false,
        }
    }
}

impl<K, H> SortedKeyedIndex<K, H>
where
    K: Eq + Hash + Clone + fmt::Display,
    H: Copy + Eq,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Every resident item, including ones staged for removal. Not sorted.
    pub fn resident(&self) -> &[H] {
        &self.items
    }

    fn ensure_loaded<S>(&mut self, src: &mut S) -> Result<()>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        if self.loaded {
            return Ok(());
        }
        if !src.owner_is_transient() {
            self.sort(src);
            let rows = src.load_all()?;
            let resident: HashSet<RecordId> =
                self.items.iter().filter_map(|h| src.record_id(*h)).collect();
            let mut added = 0usize;
            for row in rows {
                if row.id.is_some_and(|id| resident.contains(&id) || self.retired.contains(&id)) {
                    continue;
                }
                let Some(key) = src.record_key(&row) else { continue };
                if self.keys.contains_key(&key) {
                    continue;
                }
                let item = src.wrap(row)?;
                self.items.push(item);
                self.keys.insert(key, item);
                added += 1;
            }
            self.unsorted = true;
            tracing::debug!(added, "index loaded from backing rows");
        }
        self.loaded = true;
        Ok(())
    }

    fn sort<S>(&mut self, src: &S)
    where
        S: IndexSource<K, H> + ?Sized,
    {
        if !self.unsorted {
            return;
        }
        self.items.sort_by_key(|h| src.position(*h));
        self.keys.clear();
        for &item in &self.items {
            let key = src.key_of(item);
            match self.keys.get(&key) {
                Some(existing) if !src.is_pending_removal(*existing) => {}
                _ => {
                    self.keys.insert(key, item);
                }
            }
        }
        self.unsorted = false;
    }

    /// Live items in position order, loading backing rows on first use.
    pub fn items<S>(&mut self, src: &mut S) -> Result<Vec<H>>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        self.ensure_loaded(src)?;
        self.sort(src);
        Ok(self.items.iter().copied().filter(|h| !src.is_pending_removal(*h)).collect())
    }

    /// Look an item up by key. Items staged for removal are reported absent.
    pub fn item<S>(&mut self, key: &K, src: &mut S) -> Result<Option<H>>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        self.sort(src);
        if let Some(&item) = self.keys.get(key) {
            return Ok((!src.is_pending_removal(item)).then_some(item));
        }
        if self.loaded || src.owner_is_transient() {
            return Ok(None);
        }
        let Some(row) = src.load_one(key)? else {
            return Ok(None);
        };
        // The row may already be resident under a different key after renumbering.
        if let Some(id) = row.id {
            let resident = self.items.iter().any(|h| src.record_id(*h) == Some(id));
            if resident || self.retired.contains(&id) {
                return Ok(None);
            }
        }
        let item = src.wrap(row)?;
        self.retain(item, src);
        Ok(Some(item))
    }

    /// Insert or replace by key, appended at the end of the in-memory order.
    /// A superseded item is discarded without touching the backing store.
    pub fn retain<S>(&mut self, item: H, src: &S)
    where
        S: IndexSource<K, H> + ?Sized,
    {
        let key = src.key_of(item);
        if let Some(old) = self.keys.insert(key, item) {
            if old != item {
                self.items.retain(|h| *h != old);
                if let Some(id) = src.record_id(old) {
                    self.retired.insert(id);
                }
            }
        }
        self.items.retain(|h| *h != item);
        self.items.push(item);
        self.unsorted = true;
    }

    /// Remove by identity.
    pub fn drop_item<S>(&mut self, item: H, src: &S)
    where
        S: IndexSource<K, H> + ?Sized,
    {
        self.items.retain(|h| *h != item);
        let key = src.key_of(item);
        if self.keys.get(&key) == Some(&item) {
            self.keys.remove(&key);
        }
        if let Some(id) = src.record_id(item) {
            self.retired.remove(&id);
        }
        self.unsorted = true;
    }

    /// Move `item` to `new_index`, shifting every live item in between by one.
    pub fn move_item_to_index<S>(&mut self, item: H, new_index: u64, src: &mut S) -> Result<()>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        src.check_move(item)?;
        let live = self.items(src)?;
        if !live.contains(&item) {
            return Err(Error::Repository("item is not a live member of this index".into()));
        }
        let old = src.position(item);
        if old == new_index {
            return Ok(());
        }
        if new_index >= live.len() as u64 {
            return Err(Error::Repository(format!(
                "target index {new_index} out of range 0..{}",
                live.len()
            )));
        }
        for &other in &live {
            if other == item {
                continue;
            }
            let p = src.position(other);
            if old < new_index && p > old && p <= new_index {
                src.renumber(other, p - 1);
            } else if new_index < old && p >= new_index && p < old {
                src.renumber(other, p + 1);
            }
        }
        src.renumber(item, new_index);
        self.unsorted = true;
        tracing::debug!(from = old, to = new_index, "item moved");
        Ok(())
    }

    /// After `removed` was staged for removal, shift every later live item down by one.
    pub fn close_gap<S>(&mut self, removed: H, src: &mut S) -> Result<()>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        let live = self.items(src)?;
        let pos = src.position(removed);
        for other in live {
            if other == removed {
                continue;
            }
            let p = src.position(other);
            if p > pos {
                src.renumber(other, p - 1);
            }
        }
        self.unsorted = true;
        Ok(())
    }

    /// Fails if a live item with `key` exists, in memory or in the backing store.
    pub fn test_key_uniqueness<S>(&mut self, key: &K, src: &mut S) -> Result<()>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        match self.item(key, src)? {
            Some(_) => Err(Error::ItemExists(key.to_string())),
            None => Ok(()),
        }
    }

    /// Fails if a live in-memory item with `key` exists. An item staged for
    /// removal does not count, so it can be replaced right away.
    pub fn test_new_item_in_memory_uniqueness<S>(&mut self, key: &K, src: &S) -> Result<()>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        self.sort(src);
        match self.keys.get(key) {
            Some(h) if !src.is_pending_removal(*h) => Err(Error::ItemExists(key.to_string())),
            _ => Ok(()),
        }
    }

    /// Number of live items, answered from the backing store when not loaded.
    pub fn item_count<S>(&mut self, src: &mut S) -> Result<u64>
    where
        S: IndexSource<K, H> + ?Sized,
    {
        let live = |h: &&H| !src.is_pending_removal(**h);
        if self.loaded || src.owner_is_transient() {
            return Ok(self.items.iter().filter(live).count() as u64);
        }
        let backing = src.count_backing()?;
        let fresh = self
            .items
            .iter()
            .filter(|h| src.record_id(**h).is_none() && !src.is_pending_removal(**h))
            .count() as u64;
        let removed = self
            .items
            .iter()
            .filter(|h| src.record_id(**h).is_some() && src.is_pending_removal(**h))
            .count() as u64;
        Ok((backing + fresh).saturating_sub(removed + self.retired.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Entry {
        key: String,
        pos: u64,
        id: Option<RecordId>,
        removed: bool,
    }

    /// A toy owner: rows in `backing`, resident entities in `arena`.
    #[derive(Default)]
    struct Toy {
        transient: bool,
        backing: Vec<Record>,
        arena: Vec<Entry>,
        renumbered: Vec<usize>,
        full_loads: u32,
    }

    impl Toy {
        fn persisted(names: &[&str]) -> Self {
            let backing = names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    Record::bound("Node", RecordId(i as u64 + 1))
                        .with("name", *n)
                        .with("parentIndex", i as i64)
                })
                .collect();
            Self { backing, ..Default::default() }
        }

        fn fresh(&mut self, key: &str, pos: u64) -> usize {
            self.arena.push(Entry { key: key.into(), pos, id: None, removed: false });
            self.arena.len() - 1
        }
    }

    impl BackingSource for Toy {
        fn owner_is_transient(&self) -> bool {
            self.transient
        }

        fn count_backing(&self) -> Result<u64> {
            Ok(self.backing.len() as u64)
        }
    }

    impl IndexSource<String, usize> for Toy {
        fn load_all(&mut self) -> Result<Vec<Record>> {
            self.full_loads += 1;
            Ok(self.backing.clone())
        }

        fn load_one(&mut self, key: &String) -> Result<Option<Record>> {
            Ok(self.backing.iter().find(|r| r.str("name") == Some(key)).cloned())
        }

        fn record_key(&self, record: &Record) -> Option<String> {
            record.str("name").map(str::to_string)
        }

        fn wrap(&mut self, record: Record) -> Result<usize> {
            self.arena.push(Entry {
                key: record.str("name").unwrap_or_default().to_string(),
                pos: record.long("parentIndex").unwrap_or(0) as u64,
                id: record.id,
                removed: false,
            });
            Ok(self.arena.len() - 1)
        }

        fn key_of(&self, item: usize) -> String {
            self.arena[item].key.clone()
        }

        fn record_id(&self, item: usize) -> Option<RecordId> {
            self.arena[item].id
        }

        fn position(&self, item: usize) -> u64 {
            self.arena[item].pos
        }

        fn renumber(&mut self, item: usize, position: u64) {
            self.arena[item].pos = position;
            self.renumbered.push(item);
        }

        fn is_pending_removal(&self, item: usize) -> bool {
            self.arena[item].removed
        }
    }

    fn keys(idx: &mut SortedKeyedIndex<String, usize>, src: &mut Toy) -> Vec<String> {
        idx.items(src).unwrap().into_iter().map(|h| src.key_of(h)).collect()
    }

    #[test]
    fn test_transient_owner_never_loads() {
        let mut src = Toy { transient: true, ..Toy::persisted(&["a"]) };
        let mut idx = SortedKeyedIndex::new();
        let x = src.fresh("x", 0);
        idx.retain(x, &src);
        assert_eq!(keys(&mut idx, &mut src), vec!["x"]);
        assert_eq!(src.full_loads, 0);
        assert_eq!(idx.item(&"a".to_string(), &mut src).unwrap(), None);
    }

    #[test]
    fn test_load_merges_without_duplicates() {
        let mut src = Toy::persisted(&["a", "b", "c"]);
        let mut idx = SortedKeyedIndex::new();
        let b = idx.item(&"b".to_string(), &mut src).unwrap().unwrap();
        assert!(!idx.is_loaded());
        assert_eq!(keys(&mut idx, &mut src), vec!["a", "b", "c"]);
        assert_eq!(idx.item(&"b".to_string(), &mut src).unwrap(), Some(b));
        assert_eq!(src.full_loads, 1);
        keys(&mut idx, &mut src);
        assert_eq!(src.full_loads, 1);
    }

    #[test]
    fn test_removal_staged_item_is_not_found() {
        let mut src = Toy::persisted(&["a", "b"]);
        let mut idx = SortedKeyedIndex::new();
        let a = idx.item(&"a".to_string(), &mut src).unwrap().unwrap();
        src.arena[a].removed = true;
        assert_eq!(idx.item(&"a".to_string(), &mut src).unwrap(), None);
        assert!(idx.test_key_uniqueness(&"a".to_string(), &mut src).is_ok());
        assert!(idx.test_new_item_in_memory_uniqueness(&"a".to_string(), &src).is_ok());
        assert!(matches!(
            idx.test_key_uniqueness(&"b".to_string(), &mut src),
            Err(Error::ItemExists(_))
        ));
    }

    #[test]
    fn test_move_renumbers_between() {
        let mut src = Toy::persisted(&["a", "b", "c", "d"]);
        let mut idx = SortedKeyedIndex::new();
        let items = idx.items(&mut src).unwrap();
        idx.move_item_to_index(items[3], 1, &mut src).unwrap();
        assert_eq!(keys(&mut idx, &mut src), vec!["a", "d", "b", "c"]);
        let positions: Vec<_> = idx.items(&mut src).unwrap().iter().map(|h| src.position(*h)).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);

        idx.move_item_to_index(items[0], 3, &mut src).unwrap();
        assert_eq!(keys(&mut idx, &mut src), vec!["d", "b", "c", "a"]);

        src.renumbered.clear();
        idx.move_item_to_index(items[0], 3, &mut src).unwrap();
        assert!(src.renumbered.is_empty());
        assert!(idx.move_item_to_index(items[0], 4, &mut src).is_err());
    }

    #[test]
    fn test_close_gap() {
        let mut src = Toy::persisted(&["a", "b", "c"]);
        let mut idx = SortedKeyedIndex::new();
        let items = idx.items(&mut src).unwrap();
        src.arena[items[0]].removed = true;
        idx.close_gap(items[0], &mut src).unwrap();
        let positions: Vec<_> = idx.items(&mut src).unwrap().iter().map(|h| src.position(*h)).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_retain_supersedes_same_key() {
        let mut src = Toy::persisted(&["a"]);
        let mut idx = SortedKeyedIndex::new();
        let old = idx.item(&"a".to_string(), &mut src).unwrap().unwrap();
        src.arena[old].removed = true;
        let new = src.fresh("a", 1);
        idx.retain(new, &src);
        assert_eq!(idx.item(&"a".to_string(), &mut src).unwrap(), Some(new));
        // The superseded row must not come back on a full load.
        assert_eq!(idx.items(&mut src).unwrap(), vec![new]);
        assert_eq!(idx.resident().len(), 1);
    }

    #[test]
    fn test_count_without_load() {
        let mut src = Toy::persisted(&["a", "b", "c"]);
        let mut idx = SortedKeyedIndex::new();
        assert_eq!(idx.item_count(&mut src).unwrap(), 3);
        assert_eq!(src.full_loads, 0);

        let x = src.fresh("x", 3);
        idx.retain(x, &src);
        let b = idx.item(&"b".to_string(), &mut src).unwrap().unwrap();
        src.arena[b].removed = true;
        assert_eq!(idx.item_count(&mut src).unwrap(), 3);
        assert_eq!(src.full_loads, 0);

        let loaded = idx.items(&mut src).unwrap().len() as u64;
        assert_eq!(idx.item_count(&mut src).unwrap(), loaded);
    }

    #[test]
    fn test_drop_item() {
        let mut src = Toy::persisted(&["a", "b"]);
        let mut idx = SortedKeyedIndex::new();
        let items = idx.items(&mut src).unwrap();
        idx.drop_item(items[0], &src);
        assert_eq!(keys(&mut idx, &mut src), vec!["b"]);
        assert_eq!(idx.item(&"a".to_string(), &mut src).unwrap(), None);
    }
}
