//! Session-to-job binding.
//!
//! Maps an opaque caller session to at most one job id so repeated start
//! requests accumulate into the same job instead of creating duplicates.
//! The HTTP layer carries the session id; this index is the only state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

#[derive(Debug, Default)]
pub struct SessionIndex {
    bindings: Mutex<HashMap<String, Uuid>>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Uuid>> {
        self.bindings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The job bound to this session, if any.
    pub fn resolve(&self, session: &str) -> Option<Uuid> {
        self.lock().get(session).copied()
    }

    /// Resolve the bound job, creating and binding one via `create` for a
    /// first-time session. The lookup and bind happen under one lock, so
    /// two racing start requests for the same session converge on a single
    /// job.
    pub fn resolve_or_insert(&self, session: &str, create: impl FnOnce() -> Uuid) -> Uuid {
        let mut bindings = self.lock();
        if let Some(job_id) = bindings.get(session) {
            return *job_id;
        }
        let job_id = create();
        bindings.insert(session.to_string(), job_id);
        job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_binds_later_starts_resolve() {
        let index = SessionIndex::new();
        let created = Uuid::new_v4();

        let bound = index.resolve_or_insert("alice", || created);
        assert_eq!(bound, created);

        let again = index.resolve_or_insert("alice", || panic!("must not create twice"));
        assert_eq!(again, created);
        assert_eq!(index.resolve("alice"), Some(created));
    }

    #[test]
    fn sessions_are_independent() {
        let index = SessionIndex::new();
        let a = index.resolve_or_insert("alice", Uuid::new_v4);
        let b = index.resolve_or_insert("bob", Uuid::new_v4);
        assert_ne!(a, b);
        assert_eq!(index.resolve("carol"), None);
    }
}
