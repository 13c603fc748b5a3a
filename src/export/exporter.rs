//! Node subtree → directory of JSON node files.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::config::RepositoryConfig;
use crate::model::Path as NodePath;
use crate::session::{NodeHandle, Session};
use crate::{Error, Result};
use super::json::{self, NodeDocument};

/// Counts of what an export wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub nodes: usize,
    pub properties: usize,
    pub values: usize,
}

/// Writes a node and everything below it as one JSON file per node.
///
/// The exported node goes to the root file; each ordinary child `c` of a node
/// whose children live in directory `D` goes to `D/c.json`, with its own
/// children in `D/c/`. An array child becomes the directory `D/c/` holding one
/// file per item plus an ordering file.
///
/// Properties of an array node have no place in this layout and are not
/// written. A child of the exported node whose file or directory would be the
/// root file, or an array item that would shadow the ordering file, fails the
/// export before anything is written.
#[derive(Debug, Clone)]
pub struct RepositoryExporter {
    config: RepositoryConfig,
}

impl RepositoryExporter {
    pub fn new(config: &RepositoryConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn export(&self, session: &mut Session, node: NodeHandle, dir: &Path) -> Result<ExportStats> {
        for child in session.children(node)? {
            self.check_reserved(session, child, &self.config.root_file)?;
        }
        fs::create_dir_all(dir)?;
        let mut stats = ExportStats::default();
        self.write_node(session, node, &dir.join(&self.config.root_file), dir, &mut stats)?;
        tracing::info!(
            dir = %dir.display(),
            nodes = stats.nodes,
            properties = stats.properties,
            values = stats.values,
            "export finished"
        );
        Ok(stats)
    }

    /// Fails if `node` would be stored at `reserved`, or keep its children there.
    fn check_reserved(&self, session: &Session, node: NodeHandle, reserved: &str) -> Result<()> {
        let name = session.node_name(node);
        if name == reserved || format!("{name}.json") == reserved {
            return Err(Error::Repository(format!(
                "{} collides with the reserved file '{reserved}'",
                session.node_path(node)
            )));
        }
        Ok(())
    }

    fn is_array(&self, session: &Session, node: NodeHandle) -> bool {
        session.node_type(node) == self.config.array_node_type
    }

    fn write_node(
        &self,
        session: &mut Session,
        node: NodeHandle,
        file: &Path,
        children_dir: &Path,
        stats: &mut ExportStats,
    ) -> Result<()> {
        let children = session.children(node)?;
        let document = NodeDocument {
            node_type: session.node_type(node).to_string(),
            properties: self.properties_of(session, node, stats)?,
            children: children
                .iter()
                .map(|&c| {
                    let placeholder = if self.is_array(session, c) {
                        Value::Array(Vec::new())
                    } else {
                        Value::Object(Map::new())
                    };
                    (session.node_name(c).to_string(), placeholder)
                })
                .collect(),
        };
        document.write(file)?;
        stats.nodes += 1;

        for child in children {
            let name = session.node_name(child).to_string();
            NodePath::validate_segment(&name)?;
            if self.is_array(session, child) {
                self.write_array(session, child, &children_dir.join(&name), stats)?;
            } else {
                self.write_node(
                    session,
                    child,
                    &children_dir.join(format!("{name}.json")),
                    &children_dir.join(&name),
                    stats,
                )?;
            }
        }
        Ok(())
    }

    fn write_array(&self, session: &mut Session, array: NodeHandle, dir: &Path, stats: &mut ExportStats) -> Result<()> {
        fs::create_dir_all(dir)?;
        if session.count_properties(array)? > 0 {
            tracing::warn!(path = %session.node_path(array), "properties of an array node are not exported");
        }
        let items = session.children(array)?;
        for &item in &items {
            self.check_reserved(session, item, &self.config.order_file)?;
        }
        let mut order = Vec::new();
        for item in items {
            let name = session.node_name(item).to_string();
            NodePath::validate_segment(&name)?;
            self.write_node(session, item, &dir.join(format!("{name}.json")), &dir.join(&name), stats)?;
            order.push(name);
        }
        json::write_json(&dir.join(&self.config.order_file), &order)?;
        stats.nodes += 1;
        Ok(())
    }

    fn properties_of(
        &self,
        session: &mut Session,
        node: NodeHandle,
        stats: &mut ExportStats,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for property in session.properties(node)? {
            let ptype = session.property_type(property);
            let key = json::property_key(session.property_name(property), ptype);
            let value = if session.is_multi_valued(property) {
                let values = session.get_values(property)?;
                stats.values += values.len();
                Value::Array(values.iter().map(json::to_json).collect::<Result<_>>()?)
            } else {
                match session.get_value(property)? {
                    Some(raw) => {
                        stats.values += 1;
                        json::to_json(&raw)?
                    }
                    None => Value::Null,
                }
            };
            stats.properties += 1;
            out.insert(key, value);
        }
        Ok(out)
    }
}
