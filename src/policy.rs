//! Who may switch users.
//!
//! [`AuthorizationPolicy`] answers one question per request: may this caller
//! act on a switch directive (or see the widget)? A custom
//! [`AuthorizationCheck`] configured through
//! [`SwitcherConfigBuilder::authorize_with`](crate::config::SwitcherConfigBuilder::authorize_with)
//! decides alone when present. Otherwise switching must be enabled and the
//! runtime environment allowed.
//!
//! Custom checks see the *original* user while an impersonation is active,
//! so an administrator who switched into a regular account can still switch
//! back out of it.
//!
//! ```rust,ignore
//! let config = SwitcherConfig::builder()
//!     .authorize_with(|request: &AuthorizationRequest| {
//!         request.user_attribute("role").as_deref() == Some("admin")
//!     })
//!     .build();
//! ```

use crate::auth::Authenticator;
use crate::auth::impersonation::Impersonator;
use crate::config::SwitcherConfig;
use crate::identity::Identity;
use crate::session::Session;
use crate::users::{SwitchableUser, UserDirectory};
use axum::http::{HeaderMap, Method, Request, Uri};
use std::fmt;
use std::sync::Arc;

/// Request view handed to authorization checks.
///
/// Built from the parts of the incoming request plus the acting user.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Acting user: the original user while impersonating, else the current one.
    pub user: Option<Arc<dyn SwitchableUser>>,
    /// Whether the session is currently impersonating.
    pub impersonating: bool,
}

impl AuthorizationRequest {
    /// Capture a request without a user attached
    pub fn new<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            user: None,
            impersonating: false,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: Option<Arc<dyn SwitchableUser>>) -> Self {
        self.user = user;
        self
    }

    pub fn user_identity(&self) -> Option<Identity> {
        self.user.as_ref().map(|user| user.identity())
    }

    pub fn user_attribute(&self, name: &str) -> Option<String> {
        self.user.as_ref().and_then(|user| user.attribute(name))
    }
}

/// A custom rule deciding who may switch users.
pub trait AuthorizationCheck: Send + Sync {
    fn allows(&self, request: &AuthorizationRequest) -> bool;
}

impl<F> AuthorizationCheck for F
where
    F: Fn(&AuthorizationRequest) -> bool + Send + Sync,
{
    fn allows(&self, request: &AuthorizationRequest) -> bool {
        self(request)
    }
}

/// Shareable handle to a configured [`AuthorizationCheck`].
#[derive(Clone)]
pub struct AuthorizationCallback(Arc<dyn AuthorizationCheck>);

impl AuthorizationCallback {
    pub fn new<C: AuthorizationCheck + 'static>(check: C) -> Self {
        Self(Arc::new(check))
    }

    pub fn allows(&self, request: &AuthorizationRequest) -> bool {
        self.0.allows(request)
    }
}

impl fmt::Debug for AuthorizationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCallback(..)")
    }
}

/// Attaches the acting user to an [`AuthorizationRequest`].
#[derive(Clone)]
pub struct AuthorizationResolver {
    directory: UserDirectory,
    auth: Arc<dyn Authenticator>,
    impersonator: Impersonator,
}

impl AuthorizationResolver {
    pub fn new(
        directory: UserDirectory,
        auth: Arc<dyn Authenticator>,
        impersonator: Impersonator,
    ) -> Self {
        Self {
            directory,
            auth,
            impersonator,
        }
    }

    /// Resolve the user authorization should be evaluated for.
    ///
    /// While impersonating this is the original user. When there is no
    /// concrete original identity, or it no longer resolves, the request
    /// keeps the currently authenticated user. Session state is not touched.
    pub async fn resolve(
        &self,
        request: AuthorizationRequest,
        session: &Session,
    ) -> AuthorizationRequest {
        let impersonating = self.impersonator.is_impersonating(session);

        if let Some(original) = self.impersonator.original_identity(session) {
            if let Some(user) = self.directory.resolve(&original).await {
                return AuthorizationRequest {
                    user: Some(user),
                    impersonating,
                    ..request
                };
            }
            tracing::debug!(
                target: "user_switcher.policy",
                original_identity = %original,
                "Original user not resolvable, authorizing as current user"
            );
        }

        let current = match self.auth.current_identity(session).await {
            Some(identity) => self.directory.resolve(&identity).await,
            None => None,
        };

        AuthorizationRequest {
            user: current,
            impersonating,
            ..request
        }
    }
}

/// Per-request gate for switching and for showing the widget.
#[derive(Clone)]
pub struct AuthorizationPolicy {
    config: Arc<SwitcherConfig>,
    resolver: AuthorizationResolver,
}

impl AuthorizationPolicy {
    pub fn new(config: Arc<SwitcherConfig>, resolver: AuthorizationResolver) -> Self {
        Self { config, resolver }
    }

    /// Whether the caller behind `request` may act on switch directives.
    ///
    /// A configured check decides alone, ignoring `enabled` and the
    /// environment list. Without one the config-based rule applies.
    pub async fn can_act_on_request(
        &self,
        request: AuthorizationRequest,
        session: &Session,
    ) -> bool {
        match &self.config.authorization {
            Some(check) => {
                let request = self.resolver.resolve(request, session).await;
                check.allows(&request)
            }
            None => self.config.is_enabled(),
        }
    }
}
