use crate::error::Result;
use crate::traits::session::SessionData;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// A session loaded for the current request.
///
/// Values are plain strings; [`Session::put_json`] and [`Session::get_json`]
/// store structured values as JSON.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    data: SessionData,
    /// ID the session was loaded under, kept after rotation so the old
    /// record can be deleted.
    loaded_id: Option<String>,
    modified: bool,
}

impl Session {
    /// Start a brand-new session with a fresh ID
    pub fn new(ttl: Duration) -> Self {
        Self {
            id: generate_session_id(),
            data: SessionData::new(ttl),
            loaded_id: None,
            modified: false,
        }
    }

    /// Wrap data that was loaded from a store under `id`
    pub fn from_stored(id: impl Into<String>, data: SessionData) -> Self {
        let id = id.into();
        Self {
            loaded_id: Some(id.clone()),
            id,
            data,
            modified: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// ID the session had when it was loaded, if it came from a store
    pub fn loaded_id(&self) -> Option<&str> {
        self.loaded_id.as_deref()
    }

    /// Whether the ID changed since the session was loaded or created
    pub fn id_rotated(&self) -> bool {
        self.loaded_id.as_deref() != Some(self.id.as_str())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.values.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.values.insert(key.into(), value.into());
        self.modified = true;
    }

    pub fn forget(&mut self, key: &str) -> Option<String> {
        let removed = self.data.values.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// Remove a value and return it, for one-shot (flash) values
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.forget(key)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(Into::into)
    }

    pub fn put_json<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.put(key, raw);
        Ok(())
    }

    /// Move the session to a new ID, keeping its values
    ///
    /// Called on every privilege change so a session ID observed before the
    /// change cannot be replayed after it.
    pub fn regenerate_id(&mut self) {
        self.id = generate_session_id();
        self.modified = true;
    }
}

/// Shared, lockable handle to the request's [`Session`].
///
/// Inserted into request extensions by [`SessionLayer`](super::SessionLayer).
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session for reading or mutation
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }
}

fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn ttl() -> Duration {
        Duration::from_secs(60)
    }

    #[test]
    fn test_new_session_is_unmodified() {
        let session = Session::new(ttl());
        assert!(!session.is_modified());
        assert!(session.loaded_id().is_none());
        assert!(session.id_rotated());
        assert_eq!(session.id().len(), 32);
    }

    #[test]
    fn test_put_get_forget() {
        let mut session = Session::new(ttl());
        assert!(!session.has("key"));

        session.put("key", "value");
        assert!(session.has("key"));
        assert_eq!(session.get("key"), Some("value"));
        assert!(session.is_modified());

        assert_eq!(session.forget("key"), Some("value".to_string()));
        assert!(!session.has("key"));
        assert_eq!(session.forget("key"), None);
    }

    #[test]
    fn test_json_values() {
        let mut session = Session::new(ttl());
        session.put_json("identity", &Identity::Int(3)).unwrap();
        let loaded: Option<Identity> = session.get_json("identity").unwrap();
        assert_eq!(loaded, Some(Identity::Int(3)));

        let missing: Option<Identity> = session.get_json("missing").unwrap();
        assert!(missing.is_none());

        session.put("broken", "{not json");
        assert!(session.get_json::<Identity>("broken").is_err());
    }

    #[test]
    fn test_regenerate_id_keeps_values() {
        let mut session = Session::from_stored("original-id", SessionData::new(ttl()));
        session.put("key", "value");
        assert!(!session.id_rotated());

        session.regenerate_id();
        assert_ne!(session.id(), "original-id");
        assert_eq!(session.loaded_id(), Some("original-id"));
        assert!(session.id_rotated());
        assert_eq!(session.get("key"), Some("value"));
    }

    #[tokio::test]
    async fn test_handle_shares_state() {
        let handle = SessionHandle::new(Session::new(ttl()));
        let clone = handle.clone();

        handle.lock().await.put("shared", "yes");
        assert_eq!(clone.lock().await.get("shared"), Some("yes"));
    }
}
