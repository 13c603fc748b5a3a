//! Backing sources for the three sorted keyed indexes of a session:
//! node→children, node→properties and property→values.

use crate::index::{BackingSource, IndexSource};
use crate::storage::{Field, Record, RecordId};
use crate::{Error, Result};
use super::{attr, EntityHandle, NodeHandle, PropertyHandle, Session, ValueHandle};

pub(super) const CHILDREN: &str = "PICK Node x IF x.parent = ? ORDERBY x.parentIndex";
pub(super) const CHILD_BY_NAME: &str = "PICK Node x IF x.parent = ? AND x.name = ? LIMIT 1";
pub(super) const COUNT_CHILDREN: &str = "COUNT Node x IF x.parent = ?";

pub(super) const PROPERTIES: &str = "PICK Property x IF x.node = ? ORDERBY x.nodeIndex";
pub(super) const PROPERTY_BY_NAME: &str = "PICK Property x IF x.node = ? AND x.name = ? LIMIT 1";
pub(super) const COUNT_PROPERTIES: &str = "COUNT Property x IF x.node = ?";

pub(super) const VALUES: &str = "PICK Value x IF x.property = ? ORDERBY x.valueIndex";
pub(super) const VALUE_AT: &str = "PICK Value x IF x.property = ? AND x.valueIndex = ? LIMIT 1";
pub(super) const COUNT_VALUES: &str = "COUNT Value x IF x.property = ?";

pub(super) const ROOT: &str = "PICK Node x IF x.parent IS NULL AND x.nodeType = ? LIMIT 1";

fn first(rows: Vec<Record>) -> Option<Record> {
    rows.into_iter().next()
}

// ============================================================================
// node → children
// ============================================================================

pub(super) struct ChildrenOf<'s> {
    pub(super) session: &'s mut Session,
    pub(super) owner: NodeHandle,
}

impl ChildrenOf<'_> {
    fn owner_id(&self) -> Option<RecordId> {
        self.session.nodes[self.owner.0].record_id
    }
}

impl BackingSource for ChildrenOf<'_> {
    fn owner_is_transient(&self) -> bool {
        self.owner_id().is_none()
    }

    fn count_backing(&self) -> Result<u64> {
        match self.owner_id() {
            Some(id) => self.session.store.count(COUNT_CHILDREN, &[Field::Ref(id)]),
            None => Ok(0),
        }
    }
}

impl IndexSource<String, NodeHandle> for ChildrenOf<'_> {
    fn load_all(&mut self) -> Result<Vec<Record>> {
        let Some(id) = self.owner_id() else { return Ok(Vec::new()) };
        tracing::debug!(path = %self.session.nodes[self.owner.0].path, "loading children");
        self.session.store.pick(CHILDREN, &[Field::Ref(id)])
    }

    fn load_one(&mut self, key: &String) -> Result<Option<Record>> {
        let Some(id) = self.owner_id() else { return Ok(None) };
        let rows = self.session.store.pick(CHILD_BY_NAME, &[Field::Ref(id), key.as_str().into()])?;
        Ok(first(rows))
    }

    fn record_key(&self, record: &Record) -> Option<String> {
        record.str(attr::NAME).map(str::to_string)
    }

    fn wrap(&mut self, record: Record) -> Result<NodeHandle> {
        self.session.wrap_node(record, Some(self.owner))
    }

    fn key_of(&self, item: NodeHandle) -> String {
        self.session.nodes[item.0].name.clone()
    }

    fn record_id(&self, item: NodeHandle) -> Option<RecordId> {
        self.session.nodes[item.0].record_id
    }

    fn position(&self, item: NodeHandle) -> u64 {
        self.session.nodes[item.0].index
    }

    fn renumber(&mut self, item: NodeHandle, position: u64) {
        self.session.nodes[item.0].index = position;
        self.session
            .staging
            .create_persist(EntityHandle::Node(item), Some(EntityHandle::Node(self.owner)));
    }

    fn is_pending_removal(&self, item: NodeHandle) -> bool {
        self.session.staging.is_pending_removal(EntityHandle::Node(item))
    }

    fn check_move(&self, item: NodeHandle) -> Result<()> {
        self.session.ensure_writable()?;
        if self.session.nodes[item.0].parent != Some(self.owner) {
            return Err(Error::Repository(format!(
                "{} is not a child of {}",
                self.session.nodes[item.0].path, self.session.nodes[self.owner.0].path
            )));
        }
        Ok(())
    }
}

// ============================================================================
// node → properties
// ============================================================================

pub(super) struct PropertiesOf<'s> {
    pub(super) session: &'s mut Session,
    pub(super) owner: NodeHandle,
}

impl PropertiesOf<'_> {
    fn owner_id(&self) -> Option<RecordId> {
        self.session.nodes[self.owner.0].record_id
    }
}

impl BackingSource for PropertiesOf<'_> {
    fn owner_is_transient(&self) -> bool {
        self.owner_id().is_none()
    }

    fn count_backing(&self) -> Result<u64> {
        match self.owner_id() {
            Some(id) => self.session.store.count(COUNT_PROPERTIES, &[Field::Ref(id)]),
            None => Ok(0),
        }
    }
}

impl IndexSource<String, PropertyHandle> for PropertiesOf<'_> {
    fn load_all(&mut self) -> Result<Vec<Record>> {
        let Some(id) = self.owner_id() else { return Ok(Vec::new()) };
        tracing::debug!(path = %self.session.nodes[self.owner.0].path, "loading properties");
        self.session.store.pick(PROPERTIES, &[Field::Ref(id)])
    }

    fn load_one(&mut self, key: &String) -> Result<Option<Record>> {
        let Some(id) = self.owner_id() else { return Ok(None) };
        let rows = self
            .session
            .store
            .pick(PROPERTY_BY_NAME, &[Field::Ref(id), key.as_str().into()])?;
        Ok(first(rows))
    }

    fn record_key(&self, record: &Record) -> Option<String> {
        record.str(attr::NAME).map(str::to_string)
    }

    fn wrap(&mut self, record: Record) -> Result<PropertyHandle> {
        self.session.wrap_property(record, self.owner)
    }

    fn key_of(&self, item: PropertyHandle) -> String {
        self.session.properties[item.0].name.clone()
    }

    fn record_id(&self, item: PropertyHandle) -> Option<RecordId> {
        self.session.properties[item.0].record_id
    }

    fn position(&self, item: PropertyHandle) -> u64 {
        self.session.properties[item.0].index
    }

    fn renumber(&mut self, item: PropertyHandle, position: u64) {
        self.session.properties[item.0].index = position;
        self.session
            .staging
            .create_persist(EntityHandle::Property(item), Some(EntityHandle::Node(self.owner)));
    }

    fn is_pending_removal(&self, item: PropertyHandle) -> bool {
        self.session.staging.is_pending_removal(EntityHandle::Property(item))
    }
}

// ============================================================================
// property → values
// ============================================================================

pub(super) struct ValuesOf<'s> {
    pub(super) session: &'s mut Session,
    pub(super) owner: PropertyHandle,
}

impl ValuesOf<'_> {
    fn owner_id(&self) -> Option<RecordId> {
        self.session.properties[self.owner.0].record_id
    }
}

impl BackingSource for ValuesOf<'_> {
    fn owner_is_transient(&self) -> bool {
        self.owner_id().is_none()
    }

    fn count_backing(&self) -> Result<u64> {
        match self.owner_id() {
            Some(id) => self.session.store.count(COUNT_VALUES, &[Field::Ref(id)]),
            None => Ok(0),
        }
    }
}

impl IndexSource<u64, ValueHandle> for ValuesOf<'_> {
    fn load_all(&mut self) -> Result<Vec<Record>> {
        let Some(id) = self.owner_id() else { return Ok(Vec::new()) };
        tracing::debug!(property = %self.session.properties[self.owner.0].name, "loading values");
        self.session.store.pick(VALUES, &[Field::Ref(id)])
    }

    fn load_one(&mut self, key: &u64) -> Result<Option<Record>> {
        let Some(id) = self.owner_id() else { return Ok(None) };
        let rows = self.session.store.pick(VALUE_AT, &[Field::Ref(id), (*key).into()])?;
        Ok(first(rows))
    }

    fn record_key(&self, record: &Record) -> Option<u64> {
        record.long(attr::VALUE_INDEX).map(|i| i.max(0) as u64)
    }

    fn wrap(&mut self, record: Record) -> Result<ValueHandle> {
        self.session.wrap_value(record, self.owner)
    }

    fn key_of(&self, item: ValueHandle) -> u64 {
        self.session.values[item.0].index
    }

    fn record_id(&self, item: ValueHandle) -> Option<RecordId> {
        self.session.values[item.0].record_id
    }

    fn position(&self, item: ValueHandle) -> u64 {
        self.session.values[item.0].index
    }

    fn renumber(&mut self, item: ValueHandle, position: u64) {
        self.session.values[item.0].index = position;
        self.session
            .staging
            .create_persist(EntityHandle::Value(item), Some(EntityHandle::Property(self.owner)));
    }

    fn is_pending_removal(&self, item: ValueHandle) -> bool {
        self.session.staging.is_pending_removal(EntityHandle::Value(item))
    }
}
