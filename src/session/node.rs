//! Node operations: children, properties, removal and reordering.

use crate::model::{Path, PropertyType};
use crate::repository::RepositoryEvent;
use crate::{Error, Result};
use super::{
    EntityHandle, IndexManager, NodeEntry, NodeHandle, PropertyEntry, PropertyHandle, Session,
    SortedKeyedIndex,
};

impl Session {
    pub fn node_name(&self, node: NodeHandle) -> &str {
        &self.nodes[node.0].name
    }

    pub fn node_type(&self, node: NodeHandle) -> &str {
        &self.nodes[node.0].node_type
    }

    pub fn node_path(&self, node: NodeHandle) -> &Path {
        &self.nodes[node.0].path
    }

    /// `None` for the root.
    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes[node.0].parent
    }

    /// Position among siblings. The root has none.
    pub fn node_index(&self, node: NodeHandle) -> Option<u64> {
        self.nodes[node.0].parent.map(|_| self.nodes[node.0].index)
    }

    pub fn is_root(&self, node: NodeHandle) -> bool {
        self.nodes[node.0].parent.is_none()
    }

    /// Never persisted.
    pub fn is_transient(&self, entity: EntityHandle) -> bool {
        !self.is_persisted(entity)
    }

    fn ensure_node_live(&self, node: NodeHandle) -> Result<()> {
        if self.is_live(EntityHandle::Node(node)) {
            Ok(())
        } else {
            Err(Error::NodeNotFound(self.nodes[node.0].path.to_string()))
        }
    }

    // ------------------------------------------------------------------------
    // Children
    // ------------------------------------------------------------------------

    /// Create a transient child node, staged for persist.
    pub fn create_child(&mut self, parent: NodeHandle, name: &str, node_type: &str) -> Result<NodeHandle> {
        self.ensure_writable()?;
        self.ensure_node_live(parent)?;
        Path::validate_segment(name)?;
        let key = name.to_string();
        self.with_children(parent, |idx, src| idx.test_key_uniqueness(&key, src))?;
        let index = self.with_child_indexer(parent, |m, src| m.pull_next_child_index(src))?;

        let path = self.nodes[parent.0].path.child(name);
        self.nodes.push(NodeEntry::new(
            None,
            key,
            node_type.to_string(),
            path.clone(),
            Some(parent),
            index,
        ));
        let child = NodeHandle(self.nodes.len() - 1);
        self.with_children(parent, |idx, src| idx.retain(child, &*src));
        self.staging
            .create_persist(EntityHandle::Node(child), Some(EntityHandle::Node(parent)));

        tracing::debug!(path = %path, node_type, index, "node created");
        self.notify(RepositoryEvent::NodeCreated { path, node_type: node_type.to_string() });
        Ok(child)
    }

    pub fn children(&mut self, node: NodeHandle) -> Result<Vec<NodeHandle>> {
        self.with_children(node, |idx, src| idx.items(src))
    }

    pub fn child(&mut self, node: NodeHandle, name: &str) -> Result<NodeHandle> {
        let key = name.to_string();
        self.with_children(node, |idx, src| idx.item(&key, src))?
            .ok_or_else(|| Error::NodeNotFound(self.nodes[node.0].path.child(name).to_string()))
    }

    pub fn has_child(&mut self, node: NodeHandle, name: &str) -> Result<bool> {
        let key = name.to_string();
        Ok(self.with_children(node, |idx, src| idx.item(&key, src))?.is_some())
    }

    pub fn count_children(&mut self, node: NodeHandle) -> Result<u64> {
        self.with_children(node, |idx, src| idx.item_count(src))
    }

    /// Stage `node` and its subtree for removal and close the gap it leaves.
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<()> {
        self.ensure_writable()?;
        let Some(parent) = self.nodes[node.0].parent else {
            return Err(Error::ModificationNotAllowed("the root node cannot be removed".into()));
        };
        self.ensure_node_live(node)?;

        let entity = EntityHandle::Node(node);
        self.staging.create_removable(entity, Some(EntityHandle::Node(parent)));
        self.cancel_descendants(entity);
        self.with_children(parent, |idx, src| idx.close_gap(node, src))?;
        self.with_child_indexer(parent, |m, src| m.release(src))?;

        let path = self.nodes[node.0].path.clone();
        tracing::debug!(path = %path, "node staged for removal");
        self.notify(RepositoryEvent::NodeRemoved { path });
        Ok(())
    }

    /// Move `node` among its siblings.
    pub fn move_to_index(&mut self, node: NodeHandle, new_index: u64) -> Result<()> {
        self.ensure_writable()?;
        let Some(parent) = self.nodes[node.0].parent else {
            return Err(Error::ModificationNotAllowed("the root node cannot be moved".into()));
        };
        self.ensure_node_live(node)?;
        self.with_children(parent, |idx, src| idx.move_item_to_index(node, new_index, src))
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Create a single-valued property.
    pub fn create_property(&mut self, node: NodeHandle, name: &str, ptype: PropertyType) -> Result<PropertyHandle> {
        self.new_property(node, name, ptype, false)
    }

    /// Create a multi-valued property.
    pub fn create_multi_property(
        &mut self,
        node: NodeHandle,
        name: &str,
        ptype: PropertyType,
    ) -> Result<PropertyHandle> {
        self.new_property(node, name, ptype, true)
    }

    fn new_property(&mut self, node: NodeHandle, name: &str, ptype: PropertyType, multi: bool) -> Result<PropertyHandle> {
        self.ensure_writable()?;
        self.ensure_node_live(node)?;
        Path::validate_segment(name)?;
        let key = name.to_string();
        self.with_properties(node, |idx, src| idx.test_key_uniqueness(&key, src))?;
        let index = self.with_property_indexer(node, |m, src| m.pull_next_child_index(src))?;

        self.properties.push(PropertyEntry {
            record_id: None,
            name: key,
            ptype,
            multi,
            owner: node,
            index,
            detached: false,
            values: SortedKeyedIndex::new(),
            value_indexer: IndexManager::new(),
        });
        let property = PropertyHandle(self.properties.len() - 1);
        self.with_properties(node, |idx, src| idx.retain(property, &*src));
        self.staging
            .create_persist(EntityHandle::Property(property), Some(EntityHandle::Node(node)));

        tracing::debug!(path = %self.nodes[node.0].path, name, ptype = %ptype, multi, "property created");
        self.property_changed(property);
        Ok(property)
    }

    pub fn property(&mut self, node: NodeHandle, name: &str) -> Result<PropertyHandle> {
        let key = name.to_string();
        self.with_properties(node, |idx, src| idx.item(&key, src))?
            .ok_or_else(|| Error::PropertyNotFound(format!("{}@{}", name, self.nodes[node.0].path)))
    }

    pub fn properties(&mut self, node: NodeHandle) -> Result<Vec<PropertyHandle>> {
        self.with_properties(node, |idx, src| idx.items(src))
    }

    pub fn has_property(&mut self, node: NodeHandle, name: &str) -> Result<bool> {
        let key = name.to_string();
        Ok(self.with_properties(node, |idx, src| idx.item(&key, src))?.is_some())
    }

    pub fn count_properties(&mut self, node: NodeHandle) -> Result<u64> {
        self.with_properties(node, |idx, src| idx.item_count(src))
    }

    /// Stage the named property and its values for removal.
    pub fn remove_property(&mut self, node: NodeHandle, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_node_live(node)?;
        let property = self.property(node, name)?;

        let entity = EntityHandle::Property(property);
        self.staging.create_removable(entity, Some(EntityHandle::Node(node)));
        self.cancel_descendants(entity);
        self.with_properties(node, |idx, src| idx.close_gap(property, src))?;
        self.with_property_indexer(node, |m, src| m.release(src))?;

        tracing::debug!(path = %self.nodes[node.0].path, name, "property staged for removal");
        self.property_changed(property);
        Ok(())
    }

    pub(super) fn property_changed(&self, property: PropertyHandle) {
        let entry = &self.properties[property.0];
        self.notify(RepositoryEvent::PropertyChanged {
            path: self.nodes[entry.owner.0].path.clone(),
            name: entry.name.clone(),
        });
    }
}
