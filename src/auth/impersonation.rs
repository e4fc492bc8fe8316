//! Session-scoped impersonation.
//!
//! Lets an operator act as another user within their own session and later
//! return to who they were.
//!
//! # Anchor
//!
//! The first successful switch in a session records an [`OriginalAnchor`]:
//! the identity that was logged in beforehand, or the fact that nobody was.
//! Later switches never overwrite it, so however many users are visited in
//! a row, stopping returns to the state before the first switch. A switch
//! that fails removes an anchor it created itself, leaving the session as
//! it found it.
//!
//! Every successful transition rotates the session ID.
//!
//! # Example
//!
//! ```rust,ignore
//! use user_switcher::auth::impersonation::Impersonator;
//!
//! let impersonator = Impersonator::new(config, authenticator);
//!
//! impersonator.impersonate(&mut session, Identity::Int(2)).await?;
//! assert!(impersonator.is_impersonating(&session));
//!
//! impersonator.stop_impersonating(&mut session).await?;
//! ```

use super::Authenticator;
use crate::config::SwitcherConfig;
use crate::error::{Result, SwitcherError};
use crate::identity::Identity;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session key holding the serialized anchor.
pub const ANCHOR_KEY: &str = "user_switcher.original_identity";

/// Maximum length of a textual identifier, after trimming.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Where a session returns to when impersonation stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "identity", rename_all = "snake_case")]
pub enum OriginalAnchor {
    /// Not impersonating.
    None,
    /// Impersonation started while logged out; stopping logs out.
    LoggedOut,
    /// Impersonation started as this user; stopping logs back in as them.
    User(Identity),
}

impl OriginalAnchor {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The concrete original identity, if there is one.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::User(identity) => Some(identity),
            Self::None | Self::LoggedOut => None,
        }
    }
}

/// Drives impersonation for a single session.
#[derive(Clone)]
pub struct Impersonator {
    config: Arc<SwitcherConfig>,
    auth: Arc<dyn Authenticator>,
}

impl Impersonator {
    pub fn new(config: Arc<SwitcherConfig>, auth: Arc<dyn Authenticator>) -> Self {
        Self { config, auth }
    }

    /// Switch the session to `identity`.
    ///
    /// Does nothing when switching is disabled. Fails with
    /// [`SwitcherError::Validation`] for blank or oversized textual
    /// identifiers and for identities that cannot be authenticated.
    pub async fn impersonate(&self, session: &mut Session, identity: Identity) -> Result<()> {
        if !self.config.is_switching_enabled() {
            return Ok(());
        }

        let identity = validate_identity(identity)?;

        let anchored_here = if session.has(ANCHOR_KEY) {
            false
        } else {
            let anchor = match self.auth.current_identity(session).await {
                Some(current) => OriginalAnchor::User(current),
                None => OriginalAnchor::LoggedOut,
            };
            session.put_json(ANCHOR_KEY, &anchor)?;
            true
        };

        let authenticated = match self.auth.login_as(session, &identity).await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                if anchored_here {
                    session.forget(ANCHOR_KEY);
                }
                return Err(e);
            }
        };

        if !authenticated {
            if anchored_here {
                session.forget(ANCHOR_KEY);
            }
            tracing::warn!(
                target: "user_switcher.impersonation.rejected",
                target_identity = %identity,
                reason = "user_not_found",
                "Impersonation rejected: target user cannot be authenticated"
            );
            return Err(SwitcherError::validation(format!(
                "User with identifier \"{identity}\" not found or cannot be authenticated."
            )));
        }

        session.regenerate_id();

        tracing::info!(
            target: "user_switcher.impersonation.started",
            target_identity = %identity,
            nested = !anchored_here,
            "Impersonation started"
        );

        Ok(())
    }

    /// Return the session to its original state.
    ///
    /// Does nothing when not impersonating. If the original user can no
    /// longer be authenticated the session is logged out rather than left
    /// on the impersonated user.
    pub async fn stop_impersonating(&self, session: &mut Session) -> Result<()> {
        let anchor = self.anchor(session);
        if anchor.is_none() {
            return Ok(());
        }

        session.forget(ANCHOR_KEY);

        match &anchor {
            OriginalAnchor::User(original) => {
                if !self.auth.login_as(session, original).await? {
                    tracing::warn!(
                        target: "user_switcher.impersonation.stopped",
                        original_identity = %original,
                        "Original user no longer available, logging out"
                    );
                    self.auth.logout(session).await?;
                }
            }
            OriginalAnchor::LoggedOut | OriginalAnchor::None => {
                self.auth.logout(session).await?;
            }
        }

        session.regenerate_id();

        let restored = match anchor.identity() {
            Some(original) => original.to_string(),
            None => "logged_out".to_string(),
        };
        tracing::info!(
            target: "user_switcher.impersonation.stopped",
            restored = %restored,
            "Impersonation stopped"
        );

        Ok(())
    }

    pub fn is_impersonating(&self, session: &Session) -> bool {
        session.has(ANCHOR_KEY)
    }

    /// The concrete original identity; `None` when not impersonating or when
    /// impersonation started from a logged-out session.
    pub fn original_identity(&self, session: &Session) -> Option<Identity> {
        self.anchor(session).identity().cloned()
    }

    /// The anchor recorded in `session`.
    ///
    /// An unreadable anchor is treated as [`OriginalAnchor::LoggedOut`], so
    /// stopping from a corrupted session never logs in as anyone.
    pub fn anchor(&self, session: &Session) -> OriginalAnchor {
        match session.get_json::<OriginalAnchor>(ANCHOR_KEY) {
            Ok(Some(anchor)) => anchor,
            Ok(None) => OriginalAnchor::None,
            Err(e) => {
                tracing::warn!(
                    target: "user_switcher.impersonation",
                    error = %e,
                    "Unreadable impersonation anchor"
                );
                OriginalAnchor::LoggedOut
            }
        }
    }
}

/// Trim, bound and normalize an identity.
fn validate_identity(identity: Identity) -> Result<Identity> {
    let raw = match identity {
        Identity::Text(raw) => raw,
        other => return Ok(other),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SwitcherError::validation("User identifier cannot be empty."));
    }
    if trimmed.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(SwitcherError::validation(format!(
            "User identifier cannot exceed {MAX_IDENTIFIER_LENGTH} characters."
        )));
    }

    Ok(Identity::from_param(trimmed))
}
