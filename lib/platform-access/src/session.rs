//! Visitor session tracking.
//!
//! Every visitor gets a session the first time they reach a session-managed
//! route. A session is either anonymous or authenticated. Moving between the
//! two never mutates the record in place: the old ID is deleted and a new one
//! issued, so a cookie fixed by an attacker before login is worthless after it.

use gatehouse_core::SessionId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::SessionError;

/// State of a single visitor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    authenticated: bool,
}

impl Session {
    fn anonymous(id: SessionId) -> Self {
        Self {
            id,
            authenticated: false,
        }
    }

    fn authenticated(id: SessionId) -> Self {
        Self {
            id,
            authenticated: true,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns true if the session has been upgraded by an authentication provider.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Storage for visitor sessions.
///
/// Implementations must be safe to call from many request handlers at once,
/// and `upgrade`/`downgrade` must be atomic: no caller may observe both the
/// old and new IDs as live, or neither.
pub trait SessionStore: Send + Sync {
    /// Inserts a new anonymous session and returns its ID.
    fn create(&self) -> SessionId;

    /// Returns true if a session currently exists under `id`.
    fn exists(&self, id: &SessionId) -> bool;

    /// Returns whether the session is authenticated.
    ///
    /// An unknown ID is reported as unauthenticated rather than as an error.
    fn authenticated(&self, id: &SessionId) -> Result<bool, SessionError>;

    /// Replaces the session with an authenticated one under a new ID.
    fn upgrade(&self, id: &SessionId) -> Result<SessionId, SessionError>;

    /// Replaces the session with an anonymous one under a new ID.
    fn downgrade(&self, id: &SessionId) -> Result<SessionId, SessionError>;
}

/// Process-local session store guarded by a single lock.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Every critical section leaves the map consistent, so a panic elsewhere
    // holding the lock does not invalidate the data.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unused_id(sessions: &HashMap<SessionId, Session>) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !sessions.contains_key(&id) {
                return id;
            }
        }
    }

    fn rotate(
        &self,
        id: &SessionId,
        replacement: fn(SessionId) -> Session,
    ) -> Result<SessionId, SessionError> {
        let mut sessions = self.lock();

        if sessions.remove(id).is_none() {
            return Err(SessionError::NotFound);
        }

        let new_id = Self::unused_id(&sessions);
        sessions.insert(new_id.clone(), replacement(new_id.clone()));
        Ok(new_id)
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self) -> SessionId {
        let mut sessions = self.lock();
        let id = Self::unused_id(&sessions);
        sessions.insert(id.clone(), Session::anonymous(id.clone()));
        id
    }

    fn exists(&self, id: &SessionId) -> bool {
        self.lock().contains_key(id)
    }

    fn authenticated(&self, id: &SessionId) -> Result<bool, SessionError> {
        Ok(self
            .lock()
            .get(id)
            .is_some_and(Session::is_authenticated))
    }

    fn upgrade(&self, id: &SessionId) -> Result<SessionId, SessionError> {
        let new_id = self.rotate(id, Session::authenticated)?;
        tracing::info!("upgraded session from anonymous to authenticated");
        Ok(new_id)
    }

    fn downgrade(&self, id: &SessionId) -> Result<SessionId, SessionError> {
        let new_id = self.rotate(id, Session::anonymous)?;
        tracing::info!("downgraded session to anonymous");
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn created_session_is_anonymous() {
        let store = InMemorySessionStore::new();
        let id = store.create();

        assert!(store.exists(&id));
        assert_eq!(store.authenticated(&id), Ok(false));
    }

    #[test]
    fn unknown_session_is_not_authenticated() {
        let store = InMemorySessionStore::new();
        let id = SessionId::generate();

        assert!(!store.exists(&id));
        assert_eq!(store.authenticated(&id), Ok(false));
    }

    #[test]
    fn upgrade_rotates_to_authenticated_session() {
        let store = InMemorySessionStore::new();
        let id = store.create();

        let new_id = store.upgrade(&id).expect("upgrade");

        assert_ne!(new_id, id);
        assert_eq!(store.authenticated(&new_id), Ok(true));
        assert!(!store.exists(&id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn downgrade_rotates_to_anonymous_session() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        let authenticated_id = store.upgrade(&id).expect("upgrade");

        let anonymous_id = store.downgrade(&authenticated_id).expect("downgrade");

        assert_ne!(anonymous_id, authenticated_id);
        assert_eq!(store.authenticated(&anonymous_id), Ok(false));
        assert!(store.exists(&anonymous_id));
        assert!(!store.exists(&authenticated_id));
    }

    #[test]
    fn rotation_of_unknown_session_leaves_store_untouched() {
        let store = InMemorySessionStore::new();
        let live = store.create();
        let unknown = SessionId::generate();

        assert_eq!(store.upgrade(&unknown), Err(SessionError::NotFound));
        assert_eq!(store.downgrade(&unknown), Err(SessionError::NotFound));

        assert_eq!(store.len(), 1);
        assert!(store.exists(&live));
        assert_eq!(store.authenticated(&live), Ok(false));
    }

    #[test]
    fn rotated_away_id_cannot_be_upgraded_again() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        store.upgrade(&id).expect("first upgrade");

        assert_eq!(store.upgrade(&id), Err(SessionError::NotFound));
    }

    #[test]
    fn concurrent_upgrades_of_one_session_have_a_single_winner() {
        const THREADS: usize = 16;

        let store = Arc::new(InMemorySessionStore::new());
        let id = store.create();

        let results: Vec<Result<SessionId, SessionError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| scope.spawn(|| store.upgrade(&id)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread panicked"))
                .collect()
        });

        let winners: Vec<&SessionId> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| **r == Err(SessionError::NotFound))
                .count(),
            THREADS - 1
        );

        assert!(store.exists(winners[0]));
        assert_eq!(store.authenticated(winners[0]), Ok(true));
        assert!(!store.exists(&id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_creates_produce_distinct_sessions() {
        let store = InMemorySessionStore::new();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        store.create();
                    }
                });
            }
        });

        assert_eq!(store.len(), 400);
    }
}
