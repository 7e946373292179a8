//! Session store
//!
//! One slot per user. The map lock is only held long enough to find or install a slot;
//! the per-user mutex serializes handlers for the same user without blocking anyone else.

use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::error::{LostFoundError, LostFoundResult};
use crate::models::Session;

type Slot = Arc<Mutex<Session>>;

/// A removed slot can be observed by handlers that were already queued on it; they retry
/// with the replacement. More retries than this means something keeps deleting the user.
const MAX_ACQUIRE_ATTEMPTS: usize = 8;

/// Exclusive access to one user's session
pub struct SessionGuard {
    guard: OwnedMutexGuard<Session>,
    is_new: bool,
}

impl SessionGuard {
    /// Whether this is the first message the session sees
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.guard
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.guard
    }
}

/// Concurrency-safe map from user id to session
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, user_id: &str) -> Slot {
        if let Some(slot) = self.sessions.read().await.get(user_id) {
            return slot.clone();
        }
        let mut sessions = self.sessions.write().await;
        match sessions.entry(user_id.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                debug!(user_id, "Session created");
                e.insert(Arc::new(Mutex::new(Session::new(user_id)))).clone()
            }
        }
    }

    /// Lock the user's session, creating it at stage 0 on first contact
    pub async fn acquire(&self, user_id: &str) -> LostFoundResult<SessionGuard> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let mut guard = self.slot(user_id).await.lock_owned().await;
            if guard.closed {
                continue;
            }
            let is_new = guard.fresh;
            guard.fresh = false;
            return Ok(SessionGuard { guard, is_new });
        }
        Err(LostFoundError::SessionInvariant(format!(
            "session for {} removed {} times while waiting",
            user_id, MAX_ACQUIRE_ATTEMPTS
        )))
    }

    /// Remove a locked session. Handlers queued on it will get a fresh one.
    pub async fn remove(&self, session: &mut SessionGuard) {
        session.guard.closed = true;
        let slot = OwnedMutexGuard::mutex(&session.guard);
        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(&session.guard.user_id) {
            if Arc::ptr_eq(current, slot) {
                sessions.remove(&session.guard.user_id);
                debug!(user_id = %session.guard.user_id, "Session removed");
            }
        }
    }

    /// Remove a user's session if present
    pub async fn delete(&self, user_id: &str) -> bool {
        let slot = self.sessions.read().await.get(user_id).cloned();
        let Some(slot) = slot else {
            return false;
        };
        let guard = slot.lock_owned().await;
        if guard.closed {
            return false;
        }
        let mut session = SessionGuard {
            guard,
            is_new: false,
        };
        self.remove(&mut session).await;
        true
    }

    /// Mark a session active without handling a message
    pub async fn touch(&self, user_id: &str) -> bool {
        let slot = self.sessions.read().await.get(user_id).cloned();
        match slot {
            Some(slot) => {
                let mut session = slot.lock().await;
                session.touch();
                !session.closed
            }
            None => false,
        }
    }

    /// Copy of the current state, for inspection
    pub async fn snapshot(&self, user_id: &str) -> Option<Session> {
        let slot = self.sessions.read().await.get(user_id).cloned()?;
        let session = slot.lock().await;
        (!session.closed).then(|| session.clone())
    }

    /// Drop sessions idle for longer than `max_idle`. Sessions in use are skipped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|user_id, slot| {
            let Ok(mut session) = slot.try_lock() else {
                return true;
            };
            let idle_for = now
                .signed_duration_since(session.last_active_at)
                .to_std()
                .unwrap_or_default();
            let stale = idle_for > max_idle;
            if stale {
                session.closed = true;
                info!(user_id = %user_id, idle_secs = idle_for.as_secs(), "Evicting idle session");
            }
            !stale
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Evicted {} idle sessions", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;

    #[tokio::test]
    async fn test_acquire_creates_once() {
        let store = SessionStore::new();
        let first = store.acquire("zhangsan").await.unwrap();
        assert!(first.is_new());
        assert_eq!(first.stage, Stage::ChooseKind);
        drop(first);

        let second = store.acquire("zhangsan").await.unwrap();
        assert!(!second.is_new());
        drop(second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut session = store.acquire("lisi").await.unwrap();
                let seen = session.form.description.len();
                tokio::task::yield_now().await;
                session.form.description.push('x');
                assert_eq!(session.form.description.len(), seen + 1);
                session.is_new()
            }));
        }
        let mut new_count = 0;
        for h in handles {
            if h.await.unwrap() {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 1);
        let session = store.snapshot("lisi").await.unwrap();
        assert_eq!(session.form.description, "x".repeat(16));
    }

    #[tokio::test]
    async fn test_remove_hands_waiters_a_new_session() {
        let store = Arc::new(SessionStore::new());
        let mut session = store.acquire("u1").await.unwrap();
        session.enter(Stage::Image);

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let session = store.acquire("u1").await.unwrap();
                (session.stage, session.is_new())
            })
        };
        tokio::task::yield_now().await;

        store.remove(&mut session).await;
        drop(session);

        let (stage, is_new) = waiter.await.unwrap();
        assert_eq!(stage, Stage::ChooseKind);
        assert!(is_new);
    }

    #[tokio::test]
    async fn test_delete_and_touch() {
        let store = SessionStore::new();
        assert!(!store.delete("nobody").await);
        assert!(!store.touch("nobody").await);

        drop(store.acquire("u2").await.unwrap());
        assert!(store.touch("u2").await);
        assert!(store.delete("u2").await);
        assert!(store.is_empty().await);
        assert!(store.snapshot("u2").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_idle_skips_busy_sessions() {
        let store = SessionStore::new();
        {
            let mut idle = store.acquire("idle").await.unwrap();
            idle.last_active_at = Utc::now() - chrono::Duration::hours(1);
        }
        drop(store.acquire("active").await.unwrap());
        let mut busy = store.acquire("busy").await.unwrap();
        busy.last_active_at = Utc::now() - chrono::Duration::hours(1);

        let removed = store.evict_idle(Duration::from_secs(1800)).await;
        assert_eq!(removed, 1);
        assert!(store.snapshot("idle").await.is_none());
        assert!(store.snapshot("active").await.is_some());
        drop(busy);
        assert!(store.snapshot("busy").await.is_some());
    }
}
