use crate::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// One election's state behind its own lock. Holding the lock serializes phase changes,
/// the tracking chain head and every trustee and voter flag of that election.
pub type SharedElection = Arc<Mutex<ElectionState>>;

/// An election store
pub trait Store: Send + Sync {
    /// Get an election, if it exists
    fn election(&self, id: Uuid) -> Option<SharedElection>;

    /// Add a new election
    fn insert(&self, state: ElectionState) -> SharedElection;

    /// Ids of every stored election
    fn election_ids(&self) -> Vec<Uuid>;

    /// Get an election or fail with a not-found error
    fn get_election(&self, id: Uuid) -> Result<SharedElection, Error> {
        self.election(id).ok_or(Error::ElectionNotFound(id))
    }
}

/// A simple store that keeps every election in memory
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<BTreeMap<Uuid, SharedElection>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn election(&self, id: Uuid) -> Option<SharedElection> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.get(&id).cloned()
    }

    fn insert(&self, state: ElectionState) -> SharedElection {
        let id = state.id();
        let shared = Arc::new(Mutex::new(state));
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert(id, shared.clone());
        shared
    }

    fn election_ids(&self) -> Vec<Uuid> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.keys().copied().collect()
    }
}

impl From<Vec<ElectionState>> for MemStore {
    fn from(item: Vec<ElectionState>) -> Self {
        let store = MemStore::default();
        for state in item {
            store.insert(state);
        }
        store
    }
}
