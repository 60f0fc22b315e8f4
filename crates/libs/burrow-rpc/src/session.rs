use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use burrow_wire::Guid;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::error::SessionError;

type Value = Box<dyn Any + Send>;

/// Server-side state for one client session.
///
/// Values are dropped when the session is killed, so anything owning a
/// resource releases it through `Drop`.
pub struct Session {
    id: Guid,
    last_used: Mutex<Instant>,
    closed: AtomicBool,
    contents: Mutex<HashMap<String, Value>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("keys", &self.keys())
            .finish()
    }
}

impl Session {
    fn new(id: Guid, now: Instant) -> Self {
        Self {
            id,
            last_used: Mutex::new(now),
            closed: AtomicBool::new(false),
            contents: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Guid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().expect("session last_used mutex poisoned")
    }

    fn touch(&self, now: Instant) {
        *self.last_used.lock().expect("session last_used mutex poisoned") = now;
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_used()) > timeout
    }

    /// Stores `value` under `key`; fails if the key is already present.
    pub fn add<T: Any + Send>(&self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        let key = key.into();
        let mut contents = self.open_contents()?;
        if contents.contains_key(&key) {
            return Err(SessionError::DuplicateKey { key });
        }
        contents.insert(key, Box::new(value));
        Ok(())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), SessionError> {
        let previous = self.open_contents()?.insert(key.into(), Box::new(value));
        drop(previous);
        Ok(())
    }

    pub fn get<T: Any + Clone>(&self, key: &str) -> Result<T, SessionError> {
        let contents = self.contents.lock().expect("session contents mutex poisoned");
        let value =
            contents.get(key).ok_or_else(|| SessionError::KeyNotFound { key: key.to_string() })?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| SessionError::TypeMismatch { key: key.to_string() })
    }

    /// Like [`Session::get`], but absent and mistyped values are both `None`.
    pub fn try_get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.get(key).ok()
    }

    /// Runs `f` on the stored value in place.
    pub fn with_value<T: Any, R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, SessionError> {
        let mut contents = self.contents.lock().expect("session contents mutex poisoned");
        let value = contents
            .get_mut(key)
            .ok_or_else(|| SessionError::KeyNotFound { key: key.to_string() })?;
        let value = value
            .downcast_mut::<T>()
            .ok_or_else(|| SessionError::TypeMismatch { key: key.to_string() })?;
        Ok(f(value))
    }

    /// Removes and returns the value; a mistyped value stays in place.
    pub fn take<T: Any>(&self, key: &str) -> Result<T, SessionError> {
        let mut contents = self.contents.lock().expect("session contents mutex poisoned");
        let value = contents
            .remove(key)
            .ok_or_else(|| SessionError::KeyNotFound { key: key.to_string() })?;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => {
                contents.insert(key.to_string(), value);
                Err(SessionError::TypeMismatch { key: key.to_string() })
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.contents.lock().expect("session contents mutex poisoned").remove(key);
        removed.is_some()
    }

    pub fn clear(&self) {
        let drained: Vec<Value> = self
            .contents
            .lock()
            .expect("session contents mutex poisoned")
            .drain()
            .map(|(_, value)| value)
            .collect();
        drop(drained);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.contents.lock().expect("session contents mutex poisoned").contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> =
            self
                .contents
                .lock()
                .expect("session contents mutex poisoned")
                .keys()
                .cloned()
                .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.contents.lock().expect("session contents mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn open_contents(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, SessionError> {
        let contents = self.contents.lock().expect("session contents mutex poisoned");
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(contents)
    }

    /// Marks the session closed and drops everything it holds.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.clear();
    }
}

/// Table of live sessions with idle eviction.
#[derive(Debug)]
pub struct SessionStore {
    config: SessionConfig,
    sessions: Mutex<HashMap<Guid, Arc<Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self { config, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn disabled() -> Self {
        Self::new(SessionConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session for `id`, created if absent. Refreshes its last-used time.
    pub fn get_or_create(&self, id: Guid) -> Result<Arc<Session>, SessionError> {
        if !self.config.enabled {
            return Err(SessionError::Disabled);
        }
        let now = Instant::now();
        let mut sessions = self.sessions.lock().expect("session table mutex poisoned");
        let session = sessions.entry(id).or_insert_with(|| {
            log::debug!("session {id}: created");
            Arc::new(Session::new(id, now))
        });
        session.touch(now);
        Ok(Arc::clone(session))
    }

    /// The session for `id` if it exists, without refreshing it.
    pub fn get(&self, id: Guid) -> Option<Arc<Session>> {
        self.sessions.lock().expect("session table mutex poisoned").get(&id).cloned()
    }

    pub fn contains(&self, id: Guid) -> bool {
        self.sessions.lock().expect("session table mutex poisoned").contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and closes the session; `false` if there was none.
    pub fn kill(&self, id: Guid) -> bool {
        let removed = self.sessions.lock().expect("session table mutex poisoned").remove(&id);
        match removed {
            Some(session) => {
                log::debug!("session {id}: killed");
                session.close();
                true
            }
            None => false,
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evicts every session idle for longer than the timeout as of `now`,
    /// returning how many were evicted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let timeout = self.config.timeout();
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().expect("session table mutex poisoned");
            let ids: Vec<Guid> = sessions
                .iter()
                .filter(|(_, session)| session.is_expired(now, timeout))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        // Values are dropped outside the table lock.
        for session in &expired {
            log::debug!("session {}: evicted after idle timeout", session.id());
            session.close();
        }
        expired.len()
    }

    /// Sweeps every `interval` until `cancel` fires or the store is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store: Weak<SessionStore> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break;
                    },
                    _ = ticker.tick() => {}
                }

                let Some(store) = store.upgrade() else {
                    break;
                };
                let evicted = store.sweep();
                if evicted > 0 {
                    log::trace!("session sweeper: evicted {evicted}, {} remain", store.len());
                }
            }
            log::trace!("session sweeper: stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionStore};
    use crate::config::SessionConfig;
    use crate::error::SessionError;
    use burrow_wire::Guid;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Resource(Arc<AtomicUsize>);

    impl Drop for Resource {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session() -> Session {
        Session::new(Guid::new_random(), Instant::now())
    }

    #[test]
    fn add_rejects_duplicates_but_insert_replaces() {
        let session = session();
        session.add("count", 1u32).expect("add");
        assert_eq!(
            session.add("count", 2u32),
            Err(SessionError::DuplicateKey { key: "count".into() })
        );
        session.insert("count", 3u32).expect("insert");
        assert_eq!(session.get::<u32>("count"), Ok(3));
    }

    #[test]
    fn get_distinguishes_missing_from_mistyped() {
        let session = session();
        session.insert("name", String::from("cart")).expect("insert");
        assert_eq!(
            session.get::<u32>("nope"),
            Err(SessionError::KeyNotFound { key: "nope".into() })
        );
        assert_eq!(
            session.get::<u32>("name"),
            Err(SessionError::TypeMismatch { key: "name".into() })
        );
        assert_eq!(session.try_get::<String>("name").as_deref(), Some("cart"));
        assert_eq!(session.try_get::<u32>("name"), None);
    }

    #[test]
    fn with_value_mutates_in_place_and_take_keeps_mistyped() {
        let session = session();
        session.insert("buf", vec![1u8, 2]).expect("insert");
        session.with_value("buf", |buf: &mut Vec<u8>| buf.push(3)).expect("mutate");
        assert!(session.take::<String>("buf").is_err());
        assert_eq!(session.take::<Vec<u8>>("buf").expect("take"), vec![1, 2, 3]);
        assert!(!session.contains_key("buf"));
    }

    #[test]
    fn kill_releases_values_and_closes() {
        let store = SessionStore::default();
        let id = Guid::new_random();
        let dropped = Arc::new(AtomicUsize::new(0));
        let session = store.get_or_create(id).expect("create");
        session.add("a", Resource(dropped.clone())).expect("add a");
        session.add("b", Resource(dropped.clone())).expect("add b");
        assert_eq!(session.keys(), vec!["a".to_string(), "b".to_string()]);

        assert!(store.kill(id));
        assert!(!store.kill(id));
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
        assert!(session.is_closed());
        assert_eq!(session.insert("c", 1u8), Err(SessionError::Closed));

        let fresh = store.get_or_create(id).expect("recreate");
        assert!(fresh.is_empty());
        assert!(!fresh.is_closed());
    }

    #[test]
    fn disabled_store_refuses_sessions() {
        let store = SessionStore::disabled();
        assert_eq!(store.get_or_create(Guid::new_random()).err(), Some(SessionError::Disabled));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_idle_sessions() {
        let config = SessionConfig { timeout_secs: 180, ..SessionConfig::default() };
        let store = SessionStore::new(config);
        let idle = Guid::new_random();
        let busy = Guid::new_random();
        store.get_or_create(idle).expect("idle");
        store.get_or_create(busy).expect("busy");

        tokio::time::advance(Duration::from_secs(120)).await;
        store.get_or_create(busy).expect("touch");
        assert_eq!(store.sweep(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.sweep(), 1);
        assert!(!store.contains(idle));
        assert!(store.contains(busy));
        assert_eq!(store.sweep_at(Instant::now() + Duration::from_secs(181)), 1);
        assert!(store.is_empty());
    }
}
