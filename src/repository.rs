//! # Repository
//!
//! Session factory plus the listener registry shared by every session it
//! creates. The registry sits behind a `RwLock`: dispatch takes the read side,
//! register and unregister take the write side.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::{BackendConfig, RepositoryConfig};
use crate::model::Path;
use crate::session::{Session, SessionMode};
use crate::storage::{MemoryStore, RecordStore};
use crate::{Error, Result};

// ============================================================================
// Events & listeners
// ============================================================================

/// Something observable happened in a session.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    SessionStarted { mode: SessionMode },
    SessionEnded { mode: SessionMode },
    NodeCreated { path: Path, node_type: String },
    NodeRemoved { path: Path },
    PropertyChanged { path: Path, name: String },
    BeforeFlush { pending: usize },
    FlushSucceeded { applied: usize },
    FlushFailed { error: String },
}

/// Receives repository events. An error is logged and does not stop dispatch.
pub trait RepositoryListener: Send + Sync {
    fn on_event(&self, event: &RepositoryEvent) -> Result<()>;
}

impl<F> RepositoryListener for F
where
    F: Fn(&RepositoryEvent) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &RepositoryEvent) -> Result<()> {
        self(event)
    }
}

/// Registration ticket returned by [`Repository::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners shared across sessions.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RepositoryListener>)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener in registration order.
    pub fn dispatch(&self, event: &RepositoryEvent) {
        // Snapshot so a listener may (un)register without deadlocking.
        let snapshot: Vec<_> = self.listeners.read().iter().cloned().collect();
        for (id, listener) in snapshot {
            if let Err(e) = listener.on_event(event) {
                tracing::warn!(listener = ?id, error = %e, "listener failed");
            }
        }
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Repository lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Open,
    Closed,
}

/// The session factory.
pub struct Repository {
    store: Arc<dyn RecordStore>,
    config: Arc<RepositoryConfig>,
    listeners: Arc<ListenerRegistry>,
    state: Mutex<LifecycleState>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl Repository {
    /// A repository over `store`, not yet opened.
    pub fn new(store: Arc<dyn RecordStore>, config: RepositoryConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            listeners: Arc::new(ListenerRegistry::new()),
            state: Mutex::new(LifecycleState::Created),
        }
    }

    /// An opened repository over `store` with default settings.
    pub fn with_store(store: impl RecordStore) -> Result<Self> {
        let repo = Self::new(Arc::new(store), RepositoryConfig::default());
        repo.open()?;
        Ok(repo)
    }

    /// Build and open the store a config names.
    pub fn from_config(config: RepositoryConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.backend {
            BackendConfig::Memory => Arc::new(MemoryStore::new()),
        };
        let repo = Self::new(store, config);
        repo.open()?;
        Ok(repo)
    }

    /// In-memory repository for testing and embedding.
    pub fn open_memory() -> Result<Self> {
        Self::from_config(RepositoryConfig::default())
    }

    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Created => {
                *state = LifecycleState::Open;
                tracing::info!("repository opened");
                Ok(())
            }
            LifecycleState::Open => Ok(()),
            LifecycleState::Closed => Err(Error::Repository("repository is closed".into())),
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state != LifecycleState::Closed {
            *state = LifecycleState::Closed;
            tracing::info!("repository closed");
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn create_read_only_session(&self) -> Result<Session> {
        self.create_session(SessionMode::ReadOnly)
    }

    pub fn create_admin_session(&self) -> Result<Session> {
        self.create_session(SessionMode::Admin)
    }

    fn create_session(&self, mode: SessionMode) -> Result<Session> {
        let state = self.state();
        if state != LifecycleState::Open {
            return Err(Error::Repository(format!("cannot create a session while {state:?}")));
        }
        Ok(Session::new(
            Arc::clone(&self.store),
            Arc::clone(&self.listeners),
            Arc::clone(&self.config),
            mode,
        ))
    }

    pub fn register_listener(&self, listener: impl RepositoryListener + 'static) -> ListenerId {
        self.listeners.register(Arc::new(listener))
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Access the underlying store (for advanced use).
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_lifecycle() {
        let repo = Repository::new(Arc::new(MemoryStore::new()), RepositoryConfig::default());
        assert_eq!(repo.state(), LifecycleState::Created);
        assert!(repo.create_admin_session().is_err());
        repo.open().unwrap();
        assert!(repo.create_admin_session().is_ok());
        repo.close();
        assert_eq!(repo.state(), LifecycleState::Closed);
        assert!(repo.create_read_only_session().is_err());
        assert!(repo.open().is_err());
    }

    #[test]
    fn test_failing_listener_does_not_stop_dispatch() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(|_: &RepositoryEvent| -> Result<()> {
            Err(Error::Repository("boom".into()))
        }));
        let counter = Arc::clone(&hits);
        registry.register(Arc::new(move |_: &RepositoryEvent| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        registry.dispatch(&RepositoryEvent::BeforeFlush { pending: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = ListenerRegistry::new();
        let id = registry.register(Arc::new(|_: &RepositoryEvent| -> Result<()> { Ok(()) }));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }
}
