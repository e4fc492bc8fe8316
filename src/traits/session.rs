//! Session storage trait
//!
//! The switcher never talks to a session backend directly. Sessions are
//! loaded into a [`Session`](crate::session::Session) by the
//! [`SessionLayer`](crate::session::SessionLayer) and written back through
//! this trait once the response is ready.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Persisted session payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Session values as key-value pairs
    pub values: HashMap<String, String>,

    /// When the session was created
    pub created_at: SystemTime,

    /// When the session expires
    pub expires_at: SystemTime,
}

impl SessionData {
    /// Create an empty session that expires after `ttl`
    pub fn new(ttl: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            values: HashMap::new(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    /// Push the expiry `ttl` into the future
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = SystemTime::now() + ttl;
    }
}

/// Session storage trait
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load session data by session ID
    ///
    /// Returns `Ok(None)` if the session doesn't exist or has expired.
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>>;

    /// Save session data under a session ID
    async fn save(&self, session_id: &str, data: SessionData) -> Result<()>;

    /// Delete a session
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Remove expired sessions, returning how many were dropped
    async fn cleanup_expired(&self) -> Result<usize>;
}
