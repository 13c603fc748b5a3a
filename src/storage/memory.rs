//! In-memory record store.
//!
//! This is the reference implementation of `RecordStore`.
//! It keeps one table per record kind behind a single `RwLock`.
//!
//! ## Semantics
//!
//! - **Atomic commit**: every queued operation is validated before any is
//!   applied, and the whole batch is applied under one write lock.
//! - **Committed reads**: `pick`/`count`/`fetch` never see queued operations.
//! - **No indexes**: queries scan the table of the requested kind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::{Error, Result};
use super::query::{self, QueryOp};
use super::{Field, Record, RecordId, RecordStore, StoreTx, TxId, TxOp};

type Table = BTreeMap<RecordId, Record>;

/// In-memory record storage. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<HashMap<String, Table>>,
    next_id: AtomicU64,
    next_tx_id: AtomicU64,
    failing_commits: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail without applying anything.
    /// Used to exercise flush failure handling.
    pub fn fail_next_commits(&self, n: u32) {
        self.inner.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Number of committed records of one kind.
    pub fn len_of(&self, kind: &str) -> usize {
        self.inner.tables.read().get(kind).map_or(0, BTreeMap::len)
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn scan(&self, q: &query::Query, params: &[Field]) -> Vec<Record> {
        let tables = self.inner.tables.read();
        tables
            .get(&q.kind)
            .map(|t| t.values().filter(|r| q.matches(r, params)).cloned().collect())
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    fn allocate_id(&self) -> RecordId {
        RecordId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn fetch(&self, kind: &str, id: RecordId) -> Result<Option<Record>> {
        Ok(self.inner.tables.read().get(kind).and_then(|t| t.get(&id)).cloned())
    }

    fn pick(&self, query_str: &str, params: &[Field]) -> Result<Vec<Record>> {
        let q = query::parse(query_str)?;
        if q.op != QueryOp::Pick {
            return Err(Error::Query { position: 0, message: "expected a PICK query".into() });
        }
        q.check_params(params)?;
        Ok(q.finish(self.scan(&q, params)))
    }

    fn count(&self, query_str: &str, params: &[Field]) -> Result<u64> {
        let q = query::parse(query_str)?;
        if q.op != QueryOp::Count {
            return Err(Error::Query { position: 0, message: "expected a COUNT query".into() });
        }
        q.check_params(params)?;
        Ok(self.scan(&q, params).len() as u64)
    }

    fn begin(&self) -> Result<StoreTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1);
        Ok(StoreTx::new(id))
    }

    fn commit(&self, tx: StoreTx) -> Result<()> {
        let tx_id = tx.id();
        if self.take_injected_failure() {
            return Err(Error::Storage(format!("commit of {tx_id} rejected")));
        }

        let mut tables = self.inner.tables.write();

        // Validate against committed state plus the effect of earlier ops in
        // this batch, so insert-then-update and insert-then-delete both work.
        let mut live: HashSet<(String, RecordId)> = HashSet::new();
        let mut gone: HashSet<(String, RecordId)> = HashSet::new();
        let exists = |kind: &str, id: RecordId, live: &HashSet<(String, RecordId)>, gone: &HashSet<(String, RecordId)>| {
            let key = (kind.to_string(), id);
            if gone.contains(&key) {
                return false;
            }
            live.contains(&key) || tables.get(kind).is_some_and(|t| t.contains_key(&id))
        };

        for op in tx.ops() {
            match op {
                TxOp::Insert(record) => {
                    let id = record.id.ok_or_else(|| {
                        Error::Storage(format!("{tx_id}: insert of {} without id", record.kind))
                    })?;
                    if exists(&record.kind, id, &live, &gone) {
                        return Err(Error::Storage(format!(
                            "{tx_id}: {} {id} already exists",
                            record.kind
                        )));
                    }
                    gone.remove(&(record.kind.clone(), id));
                    live.insert((record.kind.clone(), id));
                }
                TxOp::Update(record) => {
                    let id = record.id.ok_or_else(|| {
                        Error::Storage(format!("{tx_id}: update of {} without id", record.kind))
                    })?;
                    if !exists(&record.kind, id, &live, &gone) {
                        return Err(Error::Storage(format!(
                            "{tx_id}: {} {id} does not exist",
                            record.kind
                        )));
                    }
                }
                TxOp::Delete { kind, id } => {
                    if !exists(kind, *id, &live, &gone) {
                        return Err(Error::Storage(format!("{tx_id}: {kind} {id} does not exist")));
                    }
                    live.remove(&(kind.clone(), *id));
                    gone.insert((kind.clone(), *id));
                }
            }
        }

        let op_count = tx.len();
        for op in tx.into_ops() {
            match op {
                TxOp::Insert(record) | TxOp::Update(record) => {
                    if let Some(id) = record.id {
                        tables.entry(record.kind.clone()).or_default().insert(id, record);
                    }
                }
                TxOp::Delete { kind, id } => {
                    if let Some(t) = tables.get_mut(&kind) {
                        t.remove(&id);
                    }
                }
            }
        }

        tracing::debug!(tx = %tx_id, ops = op_count, "memory store commit applied");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(store: &MemoryStore, name: &str, idx: i64) -> Record {
        Record::bound("Node", store.allocate_id())
            .with("parent", Field::Null)
            .with("name", name)
            .with("parentIndex", idx)
    }

    #[test]
    fn test_insert_pick_count() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(node(&store, "b", 1));
        tx.insert(node(&store, "a", 0));
        store.commit(tx).unwrap();

        let rows = store
            .pick("PICK Node x IF x.parent IS NULL ORDERBY x.parentIndex", &[])
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.str("name").unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.count("COUNT Node x IF x.name = ?", &["a".into()]).unwrap(), 1);
    }

    #[test]
    fn test_reads_do_not_see_queued_ops() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let rec = node(&store, "a", 0);
        let id = rec.id.unwrap();
        tx.insert(rec);
        assert!(store.fetch("Node", id).unwrap().is_none());
        store.commit(tx).unwrap();
        assert!(store.fetch("Node", id).unwrap().is_some());
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(node(&store, "a", 0));
        tx.delete("Node", RecordId(999));
        assert!(matches!(store.commit(tx), Err(Error::Storage(_))));
        assert_eq!(store.len_of("Node"), 0);
    }

    #[test]
    fn test_insert_then_update_and_delete_in_one_tx() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let rec = node(&store, "a", 0);
        let id = rec.id.unwrap();
        tx.insert(rec.clone());
        tx.update(rec.with("name", "renamed"));
        store.commit(tx).unwrap();
        assert_eq!(store.fetch("Node", id).unwrap().unwrap().str("name"), Some("renamed"));

        let mut tx = store.begin().unwrap();
        tx.delete("Node", id);
        store.commit(tx).unwrap();
        assert_eq!(store.len_of("Node"), 0);
    }

    #[test]
    fn test_injected_failure() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let mut tx = store.begin().unwrap();
        tx.insert(node(&store, "a", 0));
        assert!(store.commit(tx).is_err());

        let mut tx = store.begin().unwrap();
        tx.insert(node(&store, "a", 0));
        store.commit(tx).unwrap();
        assert_eq!(store.len_of("Node"), 1);
    }

    #[test]
    fn test_query_kind_mismatch() {
        let store = MemoryStore::new();
        assert!(store.pick("COUNT Node x", &[]).is_err());
        assert!(store.count("PICK Node x", &[]).is_err());
        assert!(store.pick("PICK Node x IF x.name = ?", &[]).is_err());
    }
}
