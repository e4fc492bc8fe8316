//! User Switcher - session-scoped user impersonation for Axum applications
//!
//! Lets an authorized operator temporarily act as another user within their
//! own web session and return to their original identity afterwards, with a
//! small injectable widget for picking the target user.
//!
//! # Features
//!
//! - **Impersonation**: anchor-once tracking of the original identity across
//!   nested switches and logged-out starts, with rollback on failure
//! - **Authorization**: config rules (enabled flag plus environment list) or a
//!   pluggable [`AuthorizationCheck`] that sees the original user
//! - **Middleware**: tower layers for switch directives and widget injection
//! - **Sessions**: cookie-keyed session layer with ID rotation on every switch
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, response::Html, routing::get};
//! use std::sync::Arc;
//! use user_switcher::{
//!     InMemorySessionStore, InMemoryUserSource, SessionConfig, SessionLayer, SwitcherConfig,
//!     UserRecord, UserSwitcher,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     user_switcher::init_tracing();
//!
//!     let users = InMemoryUserSource::with_users([
//!         UserRecord::new(1).with_name("Admin"),
//!         UserRecord::new(2).with_name("Customer"),
//!     ]);
//!
//!     let switcher = UserSwitcher::builder(SwitcherConfig::from_env())
//!         .user_source(Arc::new(users))
//!         .build()?;
//!
//!     let app: Router = Router::new()
//!         .route("/", get(|| async { Html("<html><body>Hello</body></html>") }))
//!         .layer(switcher.inject_layer())
//!         .layer(switcher.switch_layer())
//!         .layer(SessionLayer::new(
//!             Arc::new(InMemorySessionStore::new()),
//!             SessionConfig::from_env(),
//!         ));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
mod error;
mod identity;
pub mod policy;
pub mod session;
pub mod switch;
mod switcher;
pub mod traits;
pub mod users;
pub mod utils;
pub mod widget;

// Re-exports for public API
pub use auth::impersonation::{Impersonator, OriginalAnchor};
pub use auth::{Authenticator, SessionAuthenticator};
pub use config::{AllowedEnvironments, SwitcherConfig, SwitcherConfigBuilder};
pub use error::{ErrorResponse, Result, SwitcherError};
pub use identity::Identity;
pub use policy::{
    AuthorizationCallback, AuthorizationCheck, AuthorizationPolicy, AuthorizationRequest,
    AuthorizationResolver,
};
pub use session::{
    InMemorySessionStore, Session, SessionConfig, SessionHandle, SessionLayer, SessionService,
};
pub use switch::{SwitchDirective, SwitchUserLayer, SwitchUserService};
pub use switcher::{UserSwitcher, UserSwitcherBuilder};
pub use traits::session::{SessionData, SessionStore};
pub use users::{
    InMemoryUserSource, SwitchableUser, UserDirectory, UserRecord, UserSource, UserSummary,
};
pub use widget::{
    InjectWidgetLayer, InjectWidgetService, WidgetContext, WidgetRenderer, inject_before_body_end,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "user_switcher=debug")
/// - `USER_SWITCHER_LOG_JSON`: Set to "true" for JSON formatted logs
///
/// Audit events use dotted targets such as
/// `user_switcher.impersonation.started`, so they can be filtered with
/// `RUST_LOG=user_switcher.impersonation=info`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
