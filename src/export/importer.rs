//! Directory of JSON node files → node subtree.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::config::RepositoryConfig;
use crate::model::{Path as NodePath, PropertyType, Scalar};
use crate::session::{NodeHandle, PropertyHandle, Session};
use crate::{Error, Result};
use super::json::{self, NodeDocument};

/// Counts of what an import touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub nodes_created: usize,
    pub nodes_reused: usize,
    pub properties: usize,
    pub values: usize,
    /// Declared children whose source file was missing.
    pub skipped: usize,
}

/// Reads the layout written by [`RepositoryExporter`](super::RepositoryExporter)
/// into an existing node. Children and properties that already exist are
/// reused by name.
#[derive(Debug, Clone)]
pub struct RepositoryImporter {
    config: RepositoryConfig,
}

impl RepositoryImporter {
    pub fn new(config: &RepositoryConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Import `dir` into `target`. Changes are staged, not flushed.
    pub fn import(&self, session: &mut Session, target: NodeHandle, dir: &Path) -> Result<ImportStats> {
        session.ensure_writable()?;
        let document = NodeDocument::read(&dir.join(&self.config.root_file))?;
        for name in document.children.keys() {
            self.check_name(name, &self.config.root_file)?;
        }
        let mut stats = ImportStats::default();
        self.apply(session, target, &document, dir, &mut stats)?;
        tracing::info!(
            dir = %dir.display(),
            created = stats.nodes_created,
            reused = stats.nodes_reused,
            skipped = stats.skipped,
            "import finished"
        );
        Ok(stats)
    }

    fn apply(
        &self,
        session: &mut Session,
        node: NodeHandle,
        document: &NodeDocument,
        children_dir: &Path,
        stats: &mut ImportStats,
    ) -> Result<()> {
        self.apply_properties(session, node, &document.properties, stats)?;

        for (name, placeholder) in &document.children {
            NodePath::validate_segment(name)?;
            match placeholder {
                Value::Array(_) => {
                    let array = self.child_for(session, node, name, &self.config.array_node_type, stats)?;
                    self.import_array(session, array, &children_dir.join(name), stats)?;
                }
                Value::Object(_) => {
                    let file = children_dir.join(format!("{name}.json"));
                    if !file.is_file() {
                        tracing::warn!(file = %file.display(), "declared child has no source file, skipped");
                        stats.skipped += 1;
                        continue;
                    }
                    let child_doc = NodeDocument::read(&file)?;
                    let child = self.child_for(session, node, name, &child_doc.node_type, stats)?;
                    self.apply(session, child, &child_doc, &children_dir.join(name), stats)?;
                }
                other => {
                    return Err(Error::Repository(format!(
                        "child '{name}' must be declared as {{}} or [], got {other}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn import_array(&self, session: &mut Session, array: NodeHandle, dir: &Path, stats: &mut ImportStats) -> Result<()> {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "array directory missing, imported empty");
            return Ok(());
        }
        for name in self.item_names(dir)? {
            self.check_name(&name, &self.config.order_file)?;
            let file = dir.join(format!("{name}.json"));
            if !file.is_file() {
                tracing::warn!(file = %file.display(), "array item has no source file, skipped");
                stats.skipped += 1;
                continue;
            }
            let document = NodeDocument::read(&file)?;
            let item = self.child_for(session, array, &name, &document.node_type, stats)?;
            self.apply(session, item, &document, &dir.join(&name), stats)?;
        }
        Ok(())
    }

    /// Names become path segments; they must stay inside the import directory
    /// and must not stand for a reserved file.
    fn check_name(&self, name: &str, reserved: &str) -> Result<()> {
        NodePath::validate_segment(name)?;
        if name == reserved || format!("{name}.json") == reserved {
            return Err(Error::Repository(format!("'{name}' collides with the reserved file '{reserved}'")));
        }
        Ok(())
    }

    /// Item order: the ordering file if present, else `*.json` names sorted.
    fn item_names(&self, dir: &Path) -> Result<Vec<String>> {
        let order = dir.join(&self.config.order_file);
        if order.is_file() {
            return Ok(serde_json::from_slice(&fs::read(order)?)?);
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        tracing::debug!(dir = %dir.display(), items = names.len(), "array order from directory scan");
        Ok(names)
    }

    fn child_for(
        &self,
        session: &mut Session,
        parent: NodeHandle,
        name: &str,
        node_type: &str,
        stats: &mut ImportStats,
    ) -> Result<NodeHandle> {
        if session.has_child(parent, name)? {
            let child = session.child(parent, name)?;
            if session.node_type(child) != node_type {
                tracing::debug!(
                    path = %session.node_path(child),
                    existing = session.node_type(child),
                    incoming = node_type,
                    "reusing child with a different node type"
                );
            }
            stats.nodes_reused += 1;
            return Ok(child);
        }
        stats.nodes_created += 1;
        session.create_child(parent, name, node_type)
    }

    fn apply_properties(
        &self,
        session: &mut Session,
        node: NodeHandle,
        properties: &Map<String, Value>,
        stats: &mut ImportStats,
    ) -> Result<()> {
        for (key, value) in properties {
            let (name, ptype) = json::parse_property_key(key)?;
            let multi = value.is_array();
            let property = self.property_for(session, node, name, ptype, multi)?;
            match value {
                Value::Array(items) => {
                    let raws = items
                        .iter()
                        .map(|v| json::from_json(ptype, v))
                        .collect::<Result<Vec<_>>>()?;
                    stats.values += raws.len();
                    session.set_values(property, raws)?;
                }
                Value::Null => session.set_values(property, Vec::<Scalar>::new())?,
                v => {
                    session.set_value(property, json::from_json(ptype, v)?)?;
                    stats.values += 1;
                }
            }
            stats.properties += 1;
        }
        Ok(())
    }

    fn property_for(
        &self,
        session: &mut Session,
        node: NodeHandle,
        name: &str,
        ptype: PropertyType,
        multi: bool,
    ) -> Result<PropertyHandle> {
        if session.has_property(node, name)? {
            let property = session.property(node, name)?;
            let existing = (session.property_type(property), session.is_multi_valued(property));
            if existing != (ptype, multi) {
                return Err(Error::Repository(format!(
                    "property '{name}' at {} is {}{}, import has {}{}",
                    session.node_path(node),
                    existing.0,
                    if existing.1 { "[]" } else { "" },
                    ptype,
                    if multi { "[]" } else { "" },
                )));
            }
            return Ok(property);
        }
        if multi {
            session.create_multi_property(node, name, ptype)
        } else {
            session.create_property(node, name, ptype)
        }
    }
}
