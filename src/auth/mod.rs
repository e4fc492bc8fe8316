//! Authentication context.
//!
//! The switcher needs three things from whatever authenticates requests:
//! who is logged in, a way to log in as someone by identity, and a way to
//! log out. [`Authenticator`] is that seam. [`SessionAuthenticator`] is the
//! default, keeping the logged-in identity in the session.

pub mod impersonation;

use crate::error::Result;
use crate::identity::Identity;
use crate::session::Session;
use crate::users::UserDirectory;
use async_trait::async_trait;

/// Session key holding the authenticated identity.
pub const IDENTITY_KEY: &str = "user_switcher.auth.identity";

/// Authentication operations the switcher relies on
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Identity currently authenticated on this session, if any
    async fn current_identity(&self, session: &Session) -> Option<Identity>;

    /// Authenticate the session as `identity`
    ///
    /// Returns `Ok(false)` when no such user exists or it cannot be
    /// authenticated; the session must be left untouched in that case.
    async fn login_as(&self, session: &mut Session, identity: &Identity) -> Result<bool>;

    /// Drop the authenticated identity from the session
    async fn logout(&self, session: &mut Session) -> Result<()>;
}

/// Authenticator that stores the logged-in identity in the session
#[derive(Clone)]
pub struct SessionAuthenticator {
    directory: UserDirectory,
}

impl SessionAuthenticator {
    pub fn new(directory: UserDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    async fn current_identity(&self, session: &Session) -> Option<Identity> {
        match session.get_json::<Identity>(IDENTITY_KEY) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(
                    target: "user_switcher.auth",
                    error = %e,
                    "Ignoring unreadable authenticated identity"
                );
                None
            }
        }
    }

    async fn login_as(&self, session: &mut Session, identity: &Identity) -> Result<bool> {
        let Some(user) = self.directory.resolve(identity).await else {
            return Ok(false);
        };
        session.put_json(IDENTITY_KEY, &user.identity())?;
        Ok(true)
    }

    async fn logout(&self, session: &mut Session) -> Result<()> {
        session.forget(IDENTITY_KEY);
        Ok(())
    }
}
