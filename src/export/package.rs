//! ZIP packages: the exported file tree inside one archive.
//!
//! Both directions materialize the tree in a temporary directory and reuse
//! the plain directory exporter and importer.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::RepositoryConfig;
use crate::session::{NodeHandle, Session};
use crate::Result;
use super::{ExportStats, ImportStats, RepositoryExporter, RepositoryImporter};

/// Writes a node subtree as a ZIP package.
#[derive(Debug, Clone)]
pub struct PackageExporter {
    exporter: RepositoryExporter,
}

impl PackageExporter {
    pub fn new(config: &RepositoryConfig) -> Self {
        Self { exporter: RepositoryExporter::new(config) }
    }

    /// Export into `writer` and return it once the archive is finished.
    pub fn export<W: Write + Seek>(&self, session: &mut Session, node: NodeHandle, writer: W) -> Result<(W, ExportStats)> {
        let staging = TempDir::new()?;
        let stats = self.exporter.export(session, node, staging.path())?;

        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, path) in files_below(staging.path())? {
            zip.start_file(name, options)?;
            let mut file = File::open(&path)?;
            io::copy(&mut file, &mut zip)?;
        }
        let writer = zip.finish()?;
        tracing::debug!(nodes = stats.nodes, "package written");
        Ok((writer, stats))
    }

    pub fn export_to_file(&self, session: &mut Session, node: NodeHandle, file: &Path) -> Result<ExportStats> {
        let (_, stats) = self.export(session, node, File::create(file)?)?;
        Ok(stats)
    }
}

/// Reads a ZIP package into an existing node.
#[derive(Debug, Clone)]
pub struct PackageImporter {
    importer: RepositoryImporter,
}

impl PackageImporter {
    pub fn new(config: &RepositoryConfig) -> Self {
        Self { importer: RepositoryImporter::new(config) }
    }

    pub fn import<R: Read + Seek>(&self, session: &mut Session, target: NodeHandle, reader: R) -> Result<ImportStats> {
        session.ensure_writable()?;
        let mut archive = ZipArchive::new(reader)?;
        let staging = TempDir::new()?;
        archive.extract(staging.path())?;
        tracing::debug!(entries = archive.len(), "package extracted");
        self.importer.import(session, target, staging.path())
    }

    pub fn import_from_file(&self, session: &mut Session, target: NodeHandle, file: &Path) -> Result<ImportStats> {
        self.import(session, target, File::open(file)?)
    }
}

/// Every file below `root` as (archive name, path), sorted by archive name.
fn files_below(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((name, path));
            }
        }
    }
    out.sort();
    Ok(out)
}
