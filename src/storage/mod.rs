//! # Record Store Trait
//!
//! This is THE contract between the content tree and any backing record engine.
//! The tree only needs typed attribute records, a small query surface and
//! atomic transactions; everything else stays behind this trait.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference engine for testing/embedding |

pub mod memory;
pub mod query;
pub mod record;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

pub use memory::MemoryStore;
pub use query::{Condition, Query, QueryOp};
pub use record::{Field, Record, RecordId};

/// Record kinds used by the content tree.
pub mod kinds {
    pub const NODE: &str = "Node";
    pub const PROPERTY: &str = "Property";
    pub const VALUE: &str = "Value";
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// One queued write.
#[derive(Debug, Clone, PartialEq)]
pub enum TxOp {
    /// Insert a record. The record must already carry an allocated id.
    Insert(Record),
    /// Replace the attributes of an existing record.
    Update(Record),
    /// Delete an existing record.
    Delete { kind: String, id: RecordId },
}

/// A write transaction. Operations are queued and only applied on commit.
#[derive(Debug)]
pub struct StoreTx {
    id: TxId,
    ops: Vec<TxOp>,
}

impl StoreTx {
    pub fn new(id: TxId) -> Self {
        Self { id, ops: Vec::new() }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn insert(&mut self, record: Record) {
        self.ops.push(TxOp::Insert(record));
    }

    pub fn update(&mut self, record: Record) {
        self.ops.push(TxOp::Update(record));
    }

    pub fn delete(&mut self, kind: &str, id: RecordId) {
        self.ops.push(TxOp::Delete { kind: kind.to_string(), id });
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }
}

// ============================================================================
// RecordStore Trait
// ============================================================================

/// The backing record engine contract.
///
/// Reads observe committed state only. Writes go through a [`StoreTx`] and
/// become visible atomically on [`commit`](RecordStore::commit).
pub trait RecordStore: Send + Sync + 'static {
    /// Reserve a fresh record identity. Identities are never reused, even if
    /// the transaction that used one fails.
    fn allocate_id(&self) -> RecordId;

    /// Point lookup by identity.
    fn fetch(&self, kind: &str, id: RecordId) -> Result<Option<Record>>;

    /// Run a `PICK` query.
    fn pick(&self, query: &str, params: &[Field]) -> Result<Vec<Record>>;

    /// Run a `COUNT` query.
    fn count(&self, query: &str, params: &[Field]) -> Result<u64>;

    /// Begin a write transaction.
    fn begin(&self) -> Result<StoreTx>;

    /// Apply every queued operation, or none of them.
    fn commit(&self, tx: StoreTx) -> Result<()>;
}
