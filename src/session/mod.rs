//! # Repository Sessions
//!
//! A [`Session`] owns one view of the content tree. Nodes, properties and
//! values live in per-session arenas and are addressed by copyable handles;
//! parents are stored as handles, so there are no reference cycles.
//!
//! Every mutation is applied in memory immediately and staged for the next
//! [`Session::flush`], which writes all staged items in one backing
//! transaction.
//!
//! A session is single-threaded: it takes `&mut self` for reads too, because
//! reads may load backing rows lazily.

mod node;
mod property;
mod sources;
mod value;

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::config::RepositoryConfig;
use crate::index::{IndexManager, SortedKeyedIndex};
use crate::model::{EntityRef, Path, PropertyType, Scalar};
use crate::repository::{ListenerRegistry, RepositoryEvent};
use crate::storage::{kinds, Field, Record, RecordId, RecordStore, StoreTx};
use crate::tx::{StageOp, TransactionItem, TransactionStaging};
use crate::{Error, Result};
use sources::{ChildrenOf, PropertiesOf, ValuesOf};

/// Record attribute names.
mod attr {
    pub const PARENT: &str = "parent";
    pub const NAME: &str = "name";
    pub const NODE_TYPE: &str = "nodeType";
    pub const PARENT_INDEX: &str = "parentIndex";
    pub const NODE: &str = "node";
    pub const TYPE: &str = "type";
    pub const MULTI: &str = "multi";
    pub const NODE_INDEX: &str = "nodeIndex";
    pub const PROPERTY: &str = "property";
    pub const VALUE_INDEX: &str = "valueIndex";
    pub const DATA: &str = "data";
    pub const ENTITY_TYPE: &str = "entityType";
}

// ============================================================================
// Handles
// ============================================================================

/// Handle to a node in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

/// Handle to a property in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyHandle(usize);

/// Handle to a single value in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueHandle(usize);

/// Any stageable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityHandle {
    Node(NodeHandle),
    Property(PropertyHandle),
    Value(ValueHandle),
}

/// Session access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    ReadOnly,
    Admin,
}

// ============================================================================
// Arena entries
// ============================================================================

struct NodeEntry {
    record_id: Option<RecordId>,
    name: String,
    node_type: String,
    path: Path,
    parent: Option<NodeHandle>,
    index: u64,
    detached: bool,
    children: SortedKeyedIndex<String, NodeHandle>,
    properties: SortedKeyedIndex<String, PropertyHandle>,
    child_indexer: IndexManager,
    property_indexer: IndexManager,
}

impl NodeEntry {
    fn new(
        record_id: Option<RecordId>,
        name: String,
        node_type: String,
        path: Path,
        parent: Option<NodeHandle>,
        index: u64,
    ) -> Self {
        Self {
            record_id,
            name,
            node_type,
            path,
            parent,
            index,
            detached: false,
            children: SortedKeyedIndex::new(),
            properties: SortedKeyedIndex::new(),
            child_indexer: IndexManager::new(),
            property_indexer: IndexManager::new(),
        }
    }
}

struct PropertyEntry {
    record_id: Option<RecordId>,
    name: String,
    ptype: PropertyType,
    multi: bool,
    owner: NodeHandle,
    index: u64,
    detached: bool,
    values: SortedKeyedIndex<u64, ValueHandle>,
    value_indexer: IndexManager,
}

struct ValueEntry {
    record_id: Option<RecordId>,
    owner: PropertyHandle,
    index: u64,
    raw: Scalar,
    detached: bool,
}

// ============================================================================
// Session
// ============================================================================

/// One single-writer view of the content tree.
pub struct Session {
    store: Arc<dyn RecordStore>,
    listeners: Arc<ListenerRegistry>,
    config: Arc<RepositoryConfig>,
    mode: SessionMode,
    closed: bool,
    root: Option<NodeHandle>,
    nodes: Vec<NodeEntry>,
    properties: Vec<PropertyEntry>,
    values: Vec<ValueEntry>,
    staging: TransactionStaging<EntityHandle>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .field("nodes", &self.nodes.len())
            .field("pending", &self.staging.len())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        listeners: Arc<ListenerRegistry>,
        config: Arc<RepositoryConfig>,
        mode: SessionMode,
    ) -> Self {
        let session = Self {
            store,
            listeners,
            config,
            mode,
            closed: false,
            root: None,
            nodes: Vec::new(),
            properties: Vec::new(),
            values: Vec::new(),
            staging: TransactionStaging::new(),
        };
        tracing::info!(mode = ?mode, "session started");
        session.notify(RepositoryEvent::SessionStarted { mode });
        session
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == SessionMode::ReadOnly
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Fails unless this session may mutate the tree.
    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ModificationNotAllowed("session is closed".into()));
        }
        if self.mode == SessionMode::ReadOnly {
            return Err(Error::ModificationNotAllowed("read-only session".into()));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Repository("session is closed".into()));
        }
        Ok(())
    }

    /// The root node, looked up (or created) on first call.
    pub fn root(&mut self) -> Result<NodeHandle> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        self.ensure_open()?;
        let root_type = self.config.root_node_type.clone();
        let rows = self.store.pick(sources::ROOT, &[root_type.as_str().into()])?;
        let handle = match rows.into_iter().next() {
            Some(record) => self.wrap_node(record, None)?,
            None => {
                self.nodes.push(NodeEntry::new(None, String::new(), root_type, Path::root(), None, 0));
                let handle = NodeHandle(self.nodes.len() - 1);
                if self.mode == SessionMode::Admin {
                    self.staging.create_persist(EntityHandle::Node(handle), None);
                }
                tracing::debug!("created transient root");
                handle
            }
        };
        self.root = Some(handle);
        Ok(handle)
    }

    /// Resolve a path by walking children from the root.
    pub fn node_at(&mut self, path: &Path) -> Result<NodeHandle> {
        let mut current = self.root()?;
        for segment in path.segments() {
            current = self.child(current, segment)?;
        }
        Ok(current)
    }

    /// Resolve a `/a/b/c` path string.
    pub fn node(&mut self, path: &str) -> Result<NodeHandle> {
        self.node_at(&Path::parse(path)?)
    }

    /// Materialize the record an ENTITY value points at.
    pub fn resolve_entity(&self, entity: &EntityRef) -> Result<Option<Record>> {
        self.store.fetch(&entity.type_name, RecordId(entity.id))
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.staging.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.staging.len()
    }

    /// Whether an entity has been given a backing identity.
    pub fn is_persisted(&self, entity: EntityHandle) -> bool {
        self.record_id(entity).is_some()
    }

    /// End the session. Staged changes are not flushed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if !self.staging.is_empty() {
            tracing::warn!(pending = self.staging.len(), "closing session with unflushed changes");
        }
        self.closed = true;
        tracing::info!(mode = ?self.mode, "session ended");
        self.notify(RepositoryEvent::SessionEnded { mode: self.mode });
    }

    fn notify(&self, event: RepositoryEvent) {
        self.listeners.dispatch(&event);
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Write every staged item in one backing transaction.
    ///
    /// On failure nothing in memory changes: staged items, renumbered indices
    /// and transient entities stay as they were, so the caller can retry or
    /// abandon the session.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let work: Vec<TransactionItem<EntityHandle>> = self.staging.pending().cloned().collect();
        self.notify(RepositoryEvent::BeforeFlush { pending: work.len() });

        if work.is_empty() {
            self.notify(RepositoryEvent::FlushSucceeded { applied: 0 });
            return Ok(());
        }

        match self.apply(&work) {
            Ok(assigned) => {
                self.after_flush(&work, &assigned);
                self.staging.clear();
                tracing::info!(applied = work.len(), "flush committed");
                self.notify(RepositoryEvent::FlushSucceeded { applied: work.len() });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(error = %message, pending = work.len(), "flush failed");
                self.notify(RepositoryEvent::FlushFailed { error: message.clone() });
                Err(Error::Repository(format!("flush failed: {message}")))
            }
        }
    }

    fn apply(&self, work: &[TransactionItem<EntityHandle>]) -> Result<HashMap<EntityHandle, RecordId>> {
        let mut assigned: HashMap<EntityHandle, RecordId> = HashMap::new();
        let mut deleted: HashSet<(&'static str, RecordId)> = HashSet::new();
        let mut tx = self.store.begin()?;

        for item in work {
            match item.op {
                StageOp::Persist => {
                    if !self.is_attached(item.entity) {
                        continue;
                    }
                    let fresh = self.record_id(item.entity).is_none();
                    let record = self.build_record(item.entity, &mut assigned)?;
                    if fresh {
                        tx.insert(record);
                    } else {
                        tx.update(record);
                    }
                }
                StageOp::Remove => {
                    let kind = kind_of(item.entity);
                    if let Some(id) = self.record_id(item.entity) {
                        self.delete_cascade(&mut tx, kind, id, &mut deleted)?;
                    }
                }
            }
        }

        tracing::debug!(tx = %tx.id(), ops = tx.len(), "committing staged items");
        self.store.commit(tx)?;
        Ok(assigned)
    }

    fn after_flush(
        &mut self,
        work: &[TransactionItem<EntityHandle>],
        assigned: &HashMap<EntityHandle, RecordId>,
    ) {
        for (entity, id) in assigned {
            self.set_record_id(*entity, *id);
        }
        for item in work.iter().filter(|i| i.op == StageOp::Remove) {
            match item.entity {
                EntityHandle::Node(n) => {
                    self.nodes[n.0].detached = true;
                    if let Some(parent) = self.nodes[n.0].parent {
                        self.with_children(parent, |idx, src| idx.drop_item(n, &*src));
                    }
                }
                EntityHandle::Property(p) => {
                    self.properties[p.0].detached = true;
                    let owner = self.properties[p.0].owner;
                    self.with_properties(owner, |idx, src| idx.drop_item(p, &*src));
                }
                EntityHandle::Value(v) => {
                    self.values[v.0].detached = true;
                    let owner = self.values[v.0].owner;
                    self.with_values(owner, |idx, src| idx.drop_item(v, &*src));
                }
            }
        }
    }

    /// Delete a persisted record and every persisted record below it.
    fn delete_cascade(
        &self,
        tx: &mut StoreTx,
        kind: &'static str,
        id: RecordId,
        deleted: &mut HashSet<(&'static str, RecordId)>,
    ) -> Result<()> {
        if !deleted.insert((kind, id)) {
            return Ok(());
        }
        let owner = [Field::Ref(id)];
        if kind == kinds::NODE {
            for child in self.store.pick(sources::CHILDREN, &owner)? {
                if let Some(child_id) = child.id {
                    self.delete_cascade(tx, kinds::NODE, child_id, deleted)?;
                }
            }
            for prop in self.store.pick(sources::PROPERTIES, &owner)? {
                if let Some(prop_id) = prop.id {
                    self.delete_cascade(tx, kinds::PROPERTY, prop_id, deleted)?;
                }
            }
        } else if kind == kinds::PROPERTY {
            for value in self.store.pick(sources::VALUES, &owner)? {
                if let Some(value_id) = value.id {
                    self.delete_cascade(tx, kinds::VALUE, value_id, deleted)?;
                }
            }
        }
        tx.delete(kind, id);
        Ok(())
    }

    fn build_record(
        &self,
        entity: EntityHandle,
        assigned: &mut HashMap<EntityHandle, RecordId>,
    ) -> Result<Record> {
        let id = self.identity_for(entity, assigned);
        let record = match entity {
            EntityHandle::Node(n) => {
                let e = &self.nodes[n.0];
                let parent = match e.parent {
                    Some(p) => Some(self.parent_identity(EntityHandle::Node(p), assigned)?),
                    None => None,
                };
                Record::bound(kinds::NODE, id)
                    .with(attr::PARENT, parent)
                    .with(attr::NAME, e.name.as_str())
                    .with(attr::NODE_TYPE, e.node_type.as_str())
                    .with(attr::PARENT_INDEX, e.index)
            }
            EntityHandle::Property(p) => {
                let e = &self.properties[p.0];
                let node = self.parent_identity(EntityHandle::Node(e.owner), assigned)?;
                Record::bound(kinds::PROPERTY, id)
                    .with(attr::NODE, node)
                    .with(attr::NAME, e.name.as_str())
                    .with(attr::TYPE, e.ptype.as_str())
                    .with(attr::MULTI, e.multi)
                    .with(attr::NODE_INDEX, e.index)
            }
            EntityHandle::Value(v) => {
                let e = &self.values[v.0];
                let property = self.parent_identity(EntityHandle::Property(e.owner), assigned)?;
                let (data, entity_type) = value::scalar_to_fields(&e.raw);
                Record::bound(kinds::VALUE, id)
                    .with(attr::PROPERTY, property)
                    .with(attr::VALUE_INDEX, e.index)
                    .with(attr::DATA, data)
                    .with(attr::ENTITY_TYPE, entity_type)
            }
        };
        Ok(record)
    }

    fn identity_for(&self, entity: EntityHandle, assigned: &mut HashMap<EntityHandle, RecordId>) -> RecordId {
        match self.record_id(entity) {
            Some(id) => id,
            None => *assigned.entry(entity).or_insert_with(|| self.store.allocate_id()),
        }
    }

    /// Identity of an owner, allocating one if the owner is itself about to be inserted.
    fn parent_identity(
        &self,
        parent: EntityHandle,
        assigned: &mut HashMap<EntityHandle, RecordId>,
    ) -> Result<RecordId> {
        if let Some(id) = self.record_id(parent) {
            return Ok(id);
        }
        if let Some(id) = assigned.get(&parent) {
            return Ok(*id);
        }
        if self.staging.is_pending_persist(parent) {
            return Ok(self.identity_for(parent, assigned));
        }
        Err(Error::Repository(format!("owner {parent:?} is transient and not staged for persist")))
    }

    // ========================================================================
    // Arena helpers
    // ========================================================================

    /// Backing identity; `None` while transient.
    pub fn record_id(&self, entity: EntityHandle) -> Option<RecordId> {
        match entity {
            EntityHandle::Node(n) => self.nodes[n.0].record_id,
            EntityHandle::Property(p) => self.properties[p.0].record_id,
            EntityHandle::Value(v) => self.values[v.0].record_id,
        }
    }

    fn set_record_id(&mut self, entity: EntityHandle, id: RecordId) {
        match entity {
            EntityHandle::Node(n) => self.nodes[n.0].record_id = Some(id),
            EntityHandle::Property(p) => self.properties[p.0].record_id = Some(id),
            EntityHandle::Value(v) => self.values[v.0].record_id = Some(id),
        }
    }

    fn owner_of(&self, entity: EntityHandle) -> Option<EntityHandle> {
        match entity {
            EntityHandle::Node(n) => self.nodes[n.0].parent.map(EntityHandle::Node),
            EntityHandle::Property(p) => Some(EntityHandle::Node(self.properties[p.0].owner)),
            EntityHandle::Value(v) => Some(EntityHandle::Property(self.values[v.0].owner)),
        }
    }

    fn is_detached(&self, entity: EntityHandle) -> bool {
        match entity {
            EntityHandle::Node(n) => self.nodes[n.0].detached,
            EntityHandle::Property(p) => self.properties[p.0].detached,
            EntityHandle::Value(v) => self.values[v.0].detached,
        }
    }

    /// No ancestor is detached or staged for removal, and the entity itself is not detached.
    fn is_attached(&self, entity: EntityHandle) -> bool {
        if self.is_detached(entity) {
            return false;
        }
        let mut current = self.owner_of(entity);
        while let Some(e) = current {
            if self.is_detached(e) || self.staging.is_pending_removal(e) {
                return false;
            }
            current = self.owner_of(e);
        }
        true
    }

    /// Attached and not itself staged for removal.
    fn is_live(&self, entity: EntityHandle) -> bool {
        self.is_attached(entity) && !self.staging.is_pending_removal(entity)
    }

    /// Cancel staged work on every resident entity below `entity`.
    fn cancel_descendants(&mut self, entity: EntityHandle) {
        match entity {
            EntityHandle::Node(n) => {
                let children = self.nodes[n.0].children.resident().to_vec();
                let props = self.nodes[n.0].properties.resident().to_vec();
                for c in children {
                    self.staging.cancel(EntityHandle::Node(c));
                    self.cancel_descendants(EntityHandle::Node(c));
                }
                for p in props {
                    self.staging.cancel(EntityHandle::Property(p));
                    self.cancel_descendants(EntityHandle::Property(p));
                }
            }
            EntityHandle::Property(p) => {
                for v in self.properties[p.0].values.resident().to_vec() {
                    self.staging.cancel(EntityHandle::Value(v));
                }
            }
            EntityHandle::Value(_) => {}
        }
    }

    fn wrap_node(&mut self, record: Record, parent: Option<NodeHandle>) -> Result<NodeHandle> {
        let name = record.str(attr::NAME).unwrap_or_default().to_string();
        let node_type = record
            .str(attr::NODE_TYPE)
            .ok_or_else(|| corrupt(&record, attr::NODE_TYPE))?
            .to_string();
        let index = record.long(attr::PARENT_INDEX).unwrap_or(0).max(0) as u64;
        let path = match parent {
            Some(p) => self.nodes[p.0].path.child(&name),
            None => Path::root(),
        };
        self.nodes.push(NodeEntry::new(record.id, name, node_type, path, parent, index));
        Ok(NodeHandle(self.nodes.len() - 1))
    }

    fn wrap_property(&mut self, record: Record, owner: NodeHandle) -> Result<PropertyHandle> {
        let name = record
            .str(attr::NAME)
            .ok_or_else(|| corrupt(&record, attr::NAME))?
            .to_string();
        let ptype: PropertyType = record
            .str(attr::TYPE)
            .ok_or_else(|| corrupt(&record, attr::TYPE))?
            .parse()?;
        let multi = record.bool(attr::MULTI).unwrap_or(false);
        let index = record.long(attr::NODE_INDEX).unwrap_or(0).max(0) as u64;
        self.properties.push(PropertyEntry {
            record_id: record.id,
            name,
            ptype,
            multi,
            owner,
            index,
            detached: false,
            values: SortedKeyedIndex::new(),
            value_indexer: IndexManager::new(),
        });
        Ok(PropertyHandle(self.properties.len() - 1))
    }

    fn wrap_value(&mut self, record: Record, owner: PropertyHandle) -> Result<ValueHandle> {
        let raw = value::scalar_from_record(self.properties[owner.0].ptype, &record)?;
        let index = record.long(attr::VALUE_INDEX).unwrap_or(0).max(0) as u64;
        self.values.push(ValueEntry { record_id: record.id, owner, index, raw, detached: false });
        Ok(ValueHandle(self.values.len() - 1))
    }

    // ========================================================================
    // Index access
    // ========================================================================

    fn with_children<R>(
        &mut self,
        node: NodeHandle,
        f: impl FnOnce(&mut SortedKeyedIndex<String, NodeHandle>, &mut ChildrenOf<'_>) -> R,
    ) -> R {
        let mut index = std::mem::take(&mut self.nodes[node.0].children);
        let out = f(&mut index, &mut ChildrenOf { session: self, owner: node });
        self.nodes[node.0].children = index;
        out
    }

    fn with_properties<R>(
        &mut self,
        node: NodeHandle,
        f: impl FnOnce(&mut SortedKeyedIndex<String, PropertyHandle>, &mut PropertiesOf<'_>) -> R,
    ) -> R {
        let mut index = std::mem::take(&mut self.nodes[node.0].properties);
        let out = f(&mut index, &mut PropertiesOf { session: self, owner: node });
        self.nodes[node.0].properties = index;
        out
    }

    fn with_values<R>(
        &mut self,
        property: PropertyHandle,
        f: impl FnOnce(&mut SortedKeyedIndex<u64, ValueHandle>, &mut ValuesOf<'_>) -> R,
    ) -> R {
        let mut index = std::mem::take(&mut self.properties[property.0].values);
        let out = f(&mut index, &mut ValuesOf { session: self, owner: property });
        self.properties[property.0].values = index;
        out
    }

    fn with_child_indexer<R>(
        &mut self,
        node: NodeHandle,
        f: impl FnOnce(&mut IndexManager, &ChildrenOf<'_>) -> R,
    ) -> R {
        let mut manager = std::mem::take(&mut self.nodes[node.0].child_indexer);
        let out = f(&mut manager, &ChildrenOf { session: self, owner: node });
        self.nodes[node.0].child_indexer = manager;
        out
    }

    fn with_property_indexer<R>(
        &mut self,
        node: NodeHandle,
        f: impl FnOnce(&mut IndexManager, &PropertiesOf<'_>) -> R,
    ) -> R {
        let mut manager = std::mem::take(&mut self.nodes[node.0].property_indexer);
        let out = f(&mut manager, &PropertiesOf { session: self, owner: node });
        self.nodes[node.0].property_indexer = manager;
        out
    }

    fn with_value_indexer<R>(
        &mut self,
        property: PropertyHandle,
        f: impl FnOnce(&mut IndexManager, &ValuesOf<'_>) -> R,
    ) -> R {
        let mut manager = std::mem::take(&mut self.properties[property.0].value_indexer);
        let out = f(&mut manager, &ValuesOf { session: self, owner: property });
        self.properties[property.0].value_indexer = manager;
        out
    }
}

fn kind_of(entity: EntityHandle) -> &'static str {
    match entity {
        EntityHandle::Node(_) => kinds::NODE,
        EntityHandle::Property(_) => kinds::PROPERTY,
        EntityHandle::Value(_) => kinds::VALUE,
    }
}

fn corrupt(record: &Record, field: &str) -> Error {
    Error::Repository(format!(
        "{} record {:?} has no usable '{field}' attribute",
        record.kind, record.id
    ))
}
