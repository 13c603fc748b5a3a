//! # Import / Export
//!
//! A node subtree maps to a tree of JSON files, one per node:
//!
//! ```text
//! root.json                 {"type": "root", "children": {"a": {}, "list": []}}
//! a.json                    {"type": "folder", "properties": {"title@STRING": "Hello"}}
//! a/                        children of /a
//! list/.order               ["x", "y"]
//! list/x.json               first array item
//! list/y.json
//! ```
//!
//! Property keys are `name@TYPE`. Multi-valued properties are JSON arrays.
//! Strings, booleans, longs, doubles and decimals are native JSON; dates are
//! epoch milliseconds; binaries are base64 text; entity references are
//! `"Type;id"`.
//!
//! [`PackageExporter`] and [`PackageImporter`] carry the same tree inside a
//! ZIP archive.

pub mod exporter;
pub mod importer;
pub mod json;
pub mod package;

pub use exporter::{ExportStats, RepositoryExporter};
pub use importer::{ImportStats, RepositoryImporter};
pub use json::NodeDocument;
pub use package::{PackageExporter, PackageImporter};
