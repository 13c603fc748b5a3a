//! Transactional staging.
//!
//! Every mutable entity has at most one staged item at a time: a pending
//! persist or a pending removal. Staging one kind cancels the other, and
//! re-staging the same kind returns the existing item. Cancelled items stay
//! in the registration list marked skipped, so item ids remain stable until
//! the list is cleared after a successful flush.

use std::fmt;
use std::hash::Hash;

use hashbrown::HashMap;

/// Position of an item in the session's pending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(usize);

/// What a staged item does at flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOp {
    /// Insert if the entity has no backing identity yet, otherwise update.
    Persist,
    /// Delete the backing record (if any) and detach the entity.
    Remove,
}

/// Per-entity staging state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    #[default]
    Clean,
    PendingPersist(ItemId),
    PendingRemove(ItemId),
}

/// One staged mutation, registered with its owning parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionItem<E> {
    pub entity: E,
    pub op: StageOp,
    pub parent: Option<E>,
    skipped: bool,
}

impl<E> TransactionItem<E> {
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }
}

/// The session-wide pending list plus per-entity state.
#[derive(Debug, Clone)]
pub struct TransactionStaging<E> {
    items: Vec<TransactionItem<E>>,
    states: HashMap<E, StageState>,
}

impl<E> Default for TransactionStaging<E> {
    fn default() -> Self {
        Self { items: Vec::new(), states: HashMap::new() }
    }
}

impl<E: Copy + Eq + Hash + fmt::Debug> TransactionStaging<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, entity: E) -> StageState {
        self.states.get(&entity).copied().unwrap_or_default()
    }

    pub fn is_pending_removal(&self, entity: E) -> bool {
        matches!(self.state(entity), StageState::PendingRemove(_))
    }

    pub fn is_pending_persist(&self, entity: E) -> bool {
        matches!(self.state(entity), StageState::PendingPersist(_))
    }

    /// Stage a persist. Idempotent; cancels a pending removal.
    pub fn create_persist(&mut self, entity: E, parent: Option<E>) -> ItemId {
        match self.state(entity) {
            StageState::PendingPersist(id) => id,
            StageState::PendingRemove(id) => {
                self.skip(id);
                self.register(entity, StageOp::Persist, parent)
            }
            StageState::Clean => self.register(entity, StageOp::Persist, parent),
        }
    }

    /// Stage a removal. Idempotent; cancels a pending persist.
    pub fn create_removable(&mut self, entity: E, parent: Option<E>) -> ItemId {
        match self.state(entity) {
            StageState::PendingRemove(id) => id,
            StageState::PendingPersist(id) => {
                self.skip(id);
                self.register(entity, StageOp::Remove, parent)
            }
            StageState::Clean => self.register(entity, StageOp::Remove, parent),
        }
    }

    /// Drop whatever is staged for `entity`. Returns whether anything was pending.
    pub fn cancel(&mut self, entity: E) -> bool {
        match self.state(entity) {
            StageState::PendingPersist(id) | StageState::PendingRemove(id) => {
                self.skip(id);
                true
            }
            StageState::Clean => false,
        }
    }

    pub fn item(&self, id: ItemId) -> Option<&TransactionItem<E>> {
        self.items.get(id.0)
    }

    /// Live items in registration order.
    pub fn pending(&self) -> impl Iterator<Item = &TransactionItem<E>> {
        self.items.iter().filter(|i| !i.skipped)
    }

    /// Live items registered under `parent`.
    pub fn dependents(&self, parent: E) -> impl Iterator<Item = &TransactionItem<E>> {
        self.pending().filter(move |i| i.parent == Some(parent))
    }

    pub fn len(&self) -> usize {
        self.pending().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every item and return all entities to `Clean`.
    pub fn clear(&mut self) {
        self.items.clear();
        self.states.clear();
    }

    fn register(&mut self, entity: E, op: StageOp, parent: Option<E>) -> ItemId {
        let id = ItemId(self.items.len());
        self.items.push(TransactionItem { entity, op, parent, skipped: false });
        let state = match op {
            StageOp::Persist => StageState::PendingPersist(id),
            StageOp::Remove => StageState::PendingRemove(id),
        };
        self.states.insert(entity, state);
        tracing::debug!(entity = ?entity, op = ?op, "staged");
        id
    }

    fn skip(&mut self, id: ItemId) {
        if let Some(item) = self.items.get_mut(id.0) {
            item.skipped = true;
            let entity = item.entity;
            if matches!(
                self.states.get(&entity),
                Some(StageState::PendingPersist(cur) | StageState::PendingRemove(cur)) if *cur == id
            ) {
                self.states.remove(&entity);
            }
            tracing::debug!(entity = ?entity, "staged item skipped");
        }
    }
}
