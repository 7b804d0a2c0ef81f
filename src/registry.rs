use dashmap::DashMap;

use crate::supervisor::SupervisorHandle;

/// Process-wide directory of supervisors keyed by session id.
/// `get` is a lock-free read off the shard DashMap uses internally;
/// `create_if_absent` relies on `DashMap::entry` holding its shard lock for
/// the duration of the closure, which gives single-flight creation for free
/// — if two callers race, only one `spawn` thunk actually runs.
#[derive(Default)]
pub struct SessionRegistry {
    supervisors: DashMap<String, SupervisorHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SupervisorHandle> {
        self.supervisors.get(session_id).map(|entry| entry.clone())
    }

    pub fn create_if_absent(
        &self,
        session_id: &str,
        spawn: impl FnOnce() -> SupervisorHandle,
    ) -> SupervisorHandle {
        self.supervisors
            .entry(session_id.to_string())
            .or_insert_with(spawn)
            .clone()
    }

    pub fn remove(&self, session_id: &str) {
        self.supervisors.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.supervisors.len()
    }
}
