//! # content-repo: Hierarchical Content Tree Engine
//!
//! An ordered tree of named nodes carrying typed, single- or multi-valued
//! properties, lazily loaded from a generic record store and written back in
//! staged, atomic flushes.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `RecordStore` is the contract between the tree and storage
//! 2. **Arena sessions**: nodes, properties and values are handles into one session
//! 3. **Nothing hits storage until flush**: every mutation is staged
//! 4. **One index, three uses**: children, properties and values share `SortedKeyedIndex`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use content_repo::{PropertyType, Repository};
//!
//! # fn example() -> content_repo::Result<()> {
//! let repo = Repository::open_memory()?;
//!
//! let mut admin = repo.create_admin_session()?;
//! let root = admin.root()?;
//! let a = admin.create_child(root, "a", "folder")?;
//! let title = admin.create_property(a, "title", PropertyType::String)?;
//! admin.set_value(title, "Hello")?;
//! admin.flush()?;
//!
//! let mut reader = repo.create_read_only_session()?;
//! let a = reader.node("/a")?;
//! let title = reader.property(a, "title")?;
//! assert_eq!(reader.get_string(title)?.as_deref(), Some("Hello"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | Memory | In-memory record store for testing/embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod export;
pub mod index;
pub mod model;
pub mod repository;
pub mod session;
pub mod storage;
pub mod tx;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{EntityRef, Path, PropertyType, Scalar};

// ============================================================================
// Re-exports: Storage & configuration
// ============================================================================

pub use config::{BackendConfig, RepositoryConfig};
pub use storage::{Field, MemoryStore, Record, RecordId, RecordStore};

// ============================================================================
// Re-exports: Sessions
// ============================================================================

pub use repository::{
    LifecycleState, ListenerId, ListenerRegistry, Repository, RepositoryEvent, RepositoryListener,
};
pub use session::{EntityHandle, NodeHandle, PropertyHandle, Session, SessionMode, ValueHandle};

// ============================================================================
// Re-exports: Import / Export
// ============================================================================

pub use export::{
    ExportStats, ImportStats, PackageExporter, PackageImporter, RepositoryExporter,
    RepositoryImporter,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Value not found at index {0}")]
    ValueNotFound(u64),

    #[error("Modification not allowed: {0}")]
    ModificationNotAllowed(String),

    #[error("Item already exists: {0}")]
    ItemExists(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: PropertyType, got: PropertyType },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Query syntax error at position {position}: {message}")]
    Query { position: usize, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;
