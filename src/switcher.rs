//! Wiring for the user switcher.
//!
//! [`UserSwitcher`] builds every component from one configuration and a user
//! source and hands out the tower layers an application installs.
//!
//! # Example
//!
//! ```rust,ignore
//! use user_switcher::{InMemorySessionStore, SessionConfig, SessionLayer, SwitcherConfig, UserSwitcher};
//!
//! let switcher = UserSwitcher::builder(SwitcherConfig::from_env())
//!     .user_source(Arc::new(users))
//!     .build()?;
//!
//! let app = Router::new()
//!     .route("/", get(home))
//!     .layer(switcher.inject_layer())
//!     .layer(switcher.switch_layer())
//!     .layer(SessionLayer::new(Arc::new(InMemorySessionStore::new()), SessionConfig::from_env()));
//! ```

use crate::auth::impersonation::Impersonator;
use crate::auth::{Authenticator, SessionAuthenticator};
use crate::config::SwitcherConfig;
use crate::error::Result;
use crate::policy::{AuthorizationPolicy, AuthorizationRequest, AuthorizationResolver};
use crate::session::Session;
use crate::switch::{FLASH_ERROR_KEY, SwitchUserLayer};
use crate::users::{UserDirectory, UserSource};
use crate::widget::{InjectWidgetLayer, WidgetContext, WidgetRenderer};
use std::sync::Arc;

/// Entry point tying configuration, users, authentication and rendering
/// together.
#[derive(Clone)]
pub struct UserSwitcher {
    config: Arc<SwitcherConfig>,
    directory: UserDirectory,
    auth: Arc<dyn Authenticator>,
    impersonator: Impersonator,
    policy: AuthorizationPolicy,
    renderer: Arc<WidgetRenderer>,
}

impl UserSwitcher {
    pub fn builder(config: SwitcherConfig) -> UserSwitcherBuilder {
        UserSwitcherBuilder::new(config)
    }

    pub fn config(&self) -> &SwitcherConfig {
        &self.config
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        self.auth.clone()
    }

    pub fn impersonator(&self) -> &Impersonator {
        &self.impersonator
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    /// Layer acting on switch directives
    pub fn switch_layer(&self) -> SwitchUserLayer {
        SwitchUserLayer::new(
            self.config.clone(),
            self.policy.clone(),
            self.impersonator.clone(),
        )
    }

    /// Layer injecting the widget into HTML responses
    pub fn inject_layer(&self) -> InjectWidgetLayer {
        InjectWidgetLayer::new(self.clone())
    }

    /// Render the widget for the caller behind `request`.
    ///
    /// Empty when the caller fails the authorization policy or there are no
    /// users to list. A pending switch error is consumed only when the widget
    /// is actually shown.
    pub async fn render_widget(
        &self,
        request: AuthorizationRequest,
        session: &mut Session,
    ) -> Result<String> {
        if !self.policy.can_act_on_request(request, session).await {
            return Ok(String::new());
        }

        let users = self.directory.list_all().await;
        if users.is_empty() {
            return Ok(String::new());
        }

        let context = WidgetContext {
            users,
            current: self.auth.current_identity(session).await,
            impersonating: self.impersonator.is_impersonating(session),
            error: session.take(FLASH_ERROR_KEY),
            parameter: self.config.parameter.clone(),
        };

        self.renderer.render(&context)
    }
}

/// Builder for [`UserSwitcher`]
#[must_use = "builder does nothing until you call build()"]
pub struct UserSwitcherBuilder {
    config: SwitcherConfig,
    source: Option<Arc<dyn UserSource>>,
    auth: Option<Arc<dyn Authenticator>>,
    renderer: Option<WidgetRenderer>,
}

impl UserSwitcherBuilder {
    pub fn new(config: SwitcherConfig) -> Self {
        Self {
            config,
            source: None,
            auth: None,
            renderer: None,
        }
    }

    /// Where switchable users come from. Without one the switcher lists
    /// nobody and cannot switch.
    pub fn user_source(mut self, source: Arc<dyn UserSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the default session-backed authenticator
    pub fn authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Replace the built-in widget template
    pub fn renderer(mut self, renderer: WidgetRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Result<UserSwitcher> {
        let config = Arc::new(self.config);

        let directory = match self.source {
            Some(source) => UserDirectory::new(config.clone(), source),
            None => {
                tracing::warn!(
                    target: "user_switcher",
                    "No user source configured; the switcher will list no users"
                );
                UserDirectory::unconfigured(config.clone())
            }
        };

        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(SessionAuthenticator::new(directory.clone())));

        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => WidgetRenderer::new()?,
        };

        let impersonator = Impersonator::new(config.clone(), auth.clone());
        let resolver =
            AuthorizationResolver::new(directory.clone(), auth.clone(), impersonator.clone());
        let policy = AuthorizationPolicy::new(config.clone(), resolver);

        Ok(UserSwitcher {
            config,
            directory,
            auth,
            impersonator,
            policy,
            renderer: Arc::new(renderer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::users::{InMemoryUserSource, UserRecord};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;

    fn switcher(config: SwitcherConfig) -> UserSwitcher {
        let source = InMemoryUserSource::with_users([
            UserRecord::new(1).with_name("Original User"),
            UserRecord::new(2).with_name("Target User"),
            UserRecord::new(5).with_name("Fifth User"),
        ]);
        UserSwitcher::builder(config)
            .user_source(Arc::new(source))
            .build()
            .unwrap()
    }

    fn enabled() -> SwitcherConfig {
        SwitcherConfig::builder()
            .enabled(true)
            .any_environment()
            .build()
    }

    fn view() -> AuthorizationRequest {
        AuthorizationRequest::new(&Request::builder().uri("/").body(Body::empty()).unwrap())
    }

    fn active_item(html: &str) -> Option<&str> {
        html.split("<li ")
            .skip(1)
            .filter_map(|rest| rest.split("</li>").next())
            .find(|item| item.contains("user-switcher-item-active"))
    }

    #[tokio::test]
    async fn test_widget_highlights_impersonated_user() {
        let switcher = switcher(enabled());
        let mut session = Session::new(Duration::from_secs(60));
        let auth = switcher.authenticator();
        auth.login_as(&mut session, &Identity::Int(1)).await.unwrap();
        switcher
            .impersonator()
            .impersonate(&mut session, Identity::Int(2))
            .await
            .unwrap();

        let html = switcher.render_widget(view(), &mut session).await.unwrap();
        let active = active_item(&html).expect("an active item");
        assert!(active.contains("Target User"));
        assert!(!active.contains("Original User"));
    }

    #[tokio::test]
    async fn test_widget_highlights_target_after_logged_out_start() {
        let switcher = switcher(enabled());
        let mut session = Session::new(Duration::from_secs(60));
        switcher
            .impersonator()
            .impersonate(&mut session, Identity::Int(5))
            .await
            .unwrap();

        assert!(switcher.impersonator().original_identity(&session).is_none());
        let html = switcher.render_widget(view(), &mut session).await.unwrap();
        assert!(active_item(&html).unwrap().contains("Fifth User"));
    }

    #[tokio::test]
    async fn test_widget_hidden_when_not_authorized() {
        let switcher = switcher(SwitcherConfig::default());
        let mut session = Session::new(Duration::from_secs(60));
        let html = switcher.render_widget(view(), &mut session).await.unwrap();
        assert!(html.is_empty());
    }

    #[tokio::test]
    async fn test_flash_error_is_shown_once() {
        let switcher = switcher(enabled());
        let mut session = Session::new(Duration::from_secs(60));
        session.put(FLASH_ERROR_KEY, "Invalid user identifier: nope");

        let html = switcher.render_widget(view(), &mut session).await.unwrap();
        assert!(html.contains("Invalid user identifier: nope"));
        assert!(!session.has(FLASH_ERROR_KEY));

        let html = switcher.render_widget(view(), &mut session).await.unwrap();
        assert!(!html.contains("Invalid user identifier"));
    }

    #[tokio::test]
    async fn test_flash_error_kept_when_widget_hidden() {
        let switcher = switcher(SwitcherConfig::default());
        let mut session = Session::new(Duration::from_secs(60));
        session.put(FLASH_ERROR_KEY, "Invalid user identifier: nope");

        switcher.render_widget(view(), &mut session).await.unwrap();
        assert!(session.has(FLASH_ERROR_KEY));
    }

    #[tokio::test]
    async fn test_without_user_source_nothing_is_listed() {
        let switcher = UserSwitcher::builder(enabled()).build().unwrap();
        assert!(!switcher.directory().is_configured());

        let mut session = Session::new(Duration::from_secs(60));
        let html = switcher.render_widget(view(), &mut session).await.unwrap();
        assert!(html.is_empty());
        assert!(switcher
            .impersonator()
            .impersonate(&mut session, Identity::Int(1))
            .await
            .unwrap_err()
            .is_validation());
    }
}
