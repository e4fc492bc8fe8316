use crate::error::Result;
use crate::identity::Identity;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A user that can be listed in the switcher and logged in as.
pub trait SwitchableUser: Send + Sync + fmt::Debug {
    fn identity(&self) -> Identity;

    /// Dedicated display name. Takes precedence over every attribute.
    fn display_name(&self) -> Option<String> {
        None
    }

    /// Named attribute such as `name`, `username` or `email`.
    fn attribute(&self, name: &str) -> Option<String> {
        let _ = name;
        None
    }
}

/// Backing store of switchable users.
///
/// Implementations should fail fast; the switcher never retries.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// All users that may appear in the switcher, in display order.
    async fn all(&self) -> Result<Vec<Arc<dyn SwitchableUser>>>;

    /// Look up a single user. Unknown identities return `Ok(None)`.
    async fn find(&self, identity: &Identity) -> Result<Option<Arc<dyn SwitchableUser>>>;
}

/// Plain user record with free-form attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub identity: Identity,
    pub display_name: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl UserRecord {
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            display_name: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_attribute("name", name)
    }

    #[must_use]
    pub fn with_username(self, username: impl Into<String>) -> Self {
        self.with_attribute("username", username)
    }

    #[must_use]
    pub fn with_email(self, email: impl Into<String>) -> Self {
        self.with_attribute("email", email)
    }
}

impl SwitchableUser for UserRecord {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }
}

/// In-memory user source, in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryUserSource {
    users: Arc<RwLock<Vec<Arc<dyn SwitchableUser>>>>,
}

impl InMemoryUserSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from user records
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = users
            .into_iter()
            .map(|user| Arc::new(user) as Arc<dyn SwitchableUser>)
            .collect();
        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }

    /// Add a user, replacing any user with the same identity
    pub async fn insert(&self, user: impl SwitchableUser + 'static) {
        let identity = user.identity();
        let mut users = self.users.write().await;
        users.retain(|existing| existing.identity() != identity);
        users.push(Arc::new(user));
    }

    /// Remove a user by identity
    pub async fn remove(&self, identity: &Identity) -> bool {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|existing| &existing.identity() != identity);
        users.len() != before
    }
}

#[async_trait]
impl UserSource for InMemoryUserSource {
    async fn all(&self) -> Result<Vec<Arc<dyn SwitchableUser>>> {
        Ok(self.users.read().await.clone())
    }

    async fn find(&self, identity: &Identity) -> Result<Option<Arc<dyn SwitchableUser>>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|user| &user.identity() == identity)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_is_type_strict() {
        let source = InMemoryUserSource::with_users([
            UserRecord::new(1).with_name("Numeric"),
            UserRecord::new("alice").with_name("Alice"),
        ]);

        assert!(source.find(&Identity::Int(1)).await.unwrap().is_some());
        assert!(source.find(&Identity::from("1")).await.unwrap().is_none());
        assert!(source.find(&Identity::from("alice")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_replaces_same_identity() {
        let source = InMemoryUserSource::new();
        source.insert(UserRecord::new(1).with_name("First")).await;
        source.insert(UserRecord::new(2).with_name("Second")).await;
        source.insert(UserRecord::new(1).with_name("Renamed")).await;

        let users = source.all().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].attribute("name"), Some("Renamed".to_string()));
    }

    #[tokio::test]
    async fn test_remove() {
        let source = InMemoryUserSource::with_users([UserRecord::new(1)]);
        assert!(source.remove(&Identity::Int(1)).await);
        assert!(!source.remove(&Identity::Int(1)).await);
        assert!(source.all().await.unwrap().is_empty());
    }
}
