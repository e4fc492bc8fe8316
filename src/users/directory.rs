use super::source::{SwitchableUser, UserSource};
use crate::config::SwitcherConfig;
use crate::identity::Identity;
use serde::Serialize;
use std::sync::Arc;

/// Attributes consulted, in order, when a user has no dedicated display name.
const DISPLAY_NAME_ATTRIBUTES: [&str; 3] = ["name", "username", "email"];

/// Read projection of a user for listing and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub identity: Identity,
    pub display_name: String,
}

impl UserSummary {
    /// Project a user, resolving its display name.
    ///
    /// The dedicated display name wins, then the first present of `name`,
    /// `username` and `email`, then the identity itself.
    pub fn from_user(user: &dyn SwitchableUser) -> Self {
        let identity = user.identity();
        let display_name = user
            .display_name()
            .or_else(|| {
                DISPLAY_NAME_ATTRIBUTES
                    .iter()
                    .find_map(|attribute| user.attribute(attribute))
            })
            .unwrap_or_else(|| identity.to_string());

        Self {
            identity,
            display_name,
        }
    }
}

/// Config-aware view over a [`UserSource`].
///
/// Listing and lookup return empty results instead of failing when switching
/// is disabled, when no source was configured, or when the source errors.
#[derive(Clone)]
pub struct UserDirectory {
    config: Arc<SwitcherConfig>,
    source: Option<Arc<dyn UserSource>>,
}

impl UserDirectory {
    pub fn new(config: Arc<SwitcherConfig>, source: Arc<dyn UserSource>) -> Self {
        Self {
            config,
            source: Some(source),
        }
    }

    /// A directory with no backing source; every query comes back empty.
    pub fn unconfigured(config: Arc<SwitcherConfig>) -> Self {
        Self {
            config,
            source: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    pub async fn list_all(&self) -> Vec<UserSummary> {
        if !self.config.is_switching_enabled() {
            return Vec::new();
        }
        let Some(source) = &self.source else {
            return Vec::new();
        };

        match source.all().await {
            Ok(users) => users
                .iter()
                .map(|user| UserSummary::from_user(user.as_ref()))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    target: "user_switcher.directory.error",
                    error = %e,
                    "Failed to list switchable users"
                );
                Vec::new()
            }
        }
    }

    pub async fn find_by_id(&self, identity: &Identity) -> Option<UserSummary> {
        if !self.config.is_switching_enabled() {
            return None;
        }
        self.resolve(identity)
            .await
            .map(|user| UserSummary::from_user(user.as_ref()))
    }

    /// Load a user regardless of whether switching is enabled.
    ///
    /// Used for authentication and for resolving the original user during
    /// authorization, neither of which depends on the switcher being on.
    /// An integer that matches nobody is retried as text, so a user keyed
    /// `"42"` stays reachable through a `?_switch_user=42` link.
    pub async fn resolve(&self, identity: &Identity) -> Option<Arc<dyn SwitchableUser>> {
        if let Some(user) = self.lookup(identity).await {
            return Some(user);
        }
        let text = identity.as_text_identity()?;
        self.lookup(&text).await
    }

    async fn lookup(&self, identity: &Identity) -> Option<Arc<dyn SwitchableUser>> {
        let source = self.source.as_ref()?;
        match source.find(identity).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(
                    target: "user_switcher.directory.error",
                    identity = %identity,
                    error = %e,
                    "Failed to look up user"
                );
                None
            }
        }
    }
}
