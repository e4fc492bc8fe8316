//! Shared harness: a full Session -> Switch -> Inject stack driven through
//! `oneshot`, with a tiny client that carries the session cookie.

#![allow(dead_code)]

use axum::{
    Extension, Json, Router,
    body::Body,
    http::{Request, Response, header},
    response::Html,
    routing::get,
};
use cookie::Cookie;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use user_switcher::{
    Authenticator, Identity, InMemorySessionStore, InMemoryUserSource, SessionConfig,
    SessionHandle, SessionLayer, SwitcherConfig, UserRecord, UserSwitcher,
};

pub const COOKIE_NAME: &str = "user_switcher_session";

pub struct Harness {
    pub router: Router,
    pub sessions: InMemorySessionStore,
    pub users: InMemoryUserSource,
    pub switcher: UserSwitcher,
}

pub fn users() -> InMemoryUserSource {
    InMemoryUserSource::with_users([
        UserRecord::new(1)
            .with_name("Original User")
            .with_attribute("role", "admin"),
        UserRecord::new(2)
            .with_name("Target User")
            .with_attribute("role", "member"),
        UserRecord::new(3).with_name("Third User"),
        UserRecord::new(5).with_name("Fifth User"),
        UserRecord::new("svc-bot").with_email("bot@example.com"),
    ])
}

pub fn enabled() -> SwitcherConfig {
    SwitcherConfig::builder()
        .enabled(true)
        .any_environment()
        .environment("testing")
        .build()
}

pub fn harness(config: SwitcherConfig) -> Harness {
    let users = users();
    let switcher = UserSwitcher::builder(config)
        .user_source(Arc::new(users.clone()))
        .build()
        .unwrap();
    let sessions = InMemorySessionStore::new();
    let auth = switcher.authenticator();

    let page_auth = auth.clone();
    let login_auth = auth.clone();

    let router = Router::new()
        .route(
            "/",
            get(move |Extension(session): Extension<SessionHandle>| {
                let auth = page_auth.clone();
                async move {
                    let who = current(&auth, &session).await;
                    Html(format!(
                        "<!doctype html><html><body><p id=\"who\">user:{who}</p></body></html>"
                    ))
                }
            }),
        )
        .route(
            "/dashboard",
            get(|| async { Html("<html><body><h1>Dashboard</h1></body></html>") }),
        )
        .route("/fragment", get(|| async { Html("<p>partial</p>") }))
        .route("/api", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/login/{id}",
            get(
                move |Extension(session): Extension<SessionHandle>,
                      axum::extract::Path(id): axum::extract::Path<String>| {
                    let auth = login_auth.clone();
                    async move {
                        let mut session = session.lock().await;
                        let ok = auth
                            .login_as(&mut session, &Identity::from_param(&id))
                            .await
                            .unwrap();
                        if ok { "logged in" } else { "unknown user" }
                    }
                },
            ),
        )
        .layer(switcher.inject_layer())
        .layer(switcher.switch_layer())
        .layer(SessionLayer::new(
            Arc::new(sessions.clone()),
            SessionConfig::default(),
        ));

    Harness {
        router,
        sessions,
        users,
        switcher,
    }
}

async fn current(auth: &Arc<dyn Authenticator>, session: &SessionHandle) -> String {
    let session = session.lock().await;
    auth.current_identity(&session)
        .await
        .map(|identity| identity.to_string())
        .unwrap_or_else(|| "guest".to_string())
}

/// Browser-like client holding the session cookie between requests.
pub struct Client {
    router: Router,
    pub cookie: Option<String>,
}

impl Client {
    pub fn new(harness: &Harness) -> Self {
        Self {
            router: harness.router.clone(),
            cookie: None,
        }
    }

    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri), Body::empty()).await
    }

    pub async fn post_form(&mut self, uri: &str, form: &'static str) -> Response<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::CONTENT_LENGTH, form.len());
        self.send(builder, Body::from(form)).await
    }

    async fn send(
        &mut self,
        mut builder: axum::http::request::Builder,
        body: Body,
    ) -> Response<Body> {
        if let Some(id) = &self.cookie {
            builder = builder.header(header::COOKIE, format!("{COOKIE_NAME}={id}"));
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        if let Some(id) = session_cookie(&response) {
            self.cookie = Some(id);
        }
        response
    }

    pub async fn login(&mut self, id: &str) {
        let response = self.get(&format!("/login/{id}")).await;
        assert_eq!(body_string(response).await, "logged in");
    }

    /// Identity the home page reports, `guest` when logged out.
    pub async fn whoami(&mut self) -> String {
        let html = body_string(self.get("/").await).await;
        html.split("user:")
            .nth(1)
            .and_then(|rest| rest.split('<').next())
            .unwrap_or_default()
            .to_string()
    }
}

pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw.to_string()).ok())
        .find(|cookie| cookie.name() == COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

/// The `<li>` items of a rendered widget.
pub fn widget_items(html: &str) -> Vec<&str> {
    html.split("<li ")
        .skip(1)
        .filter_map(|rest| rest.split("</li>").next())
        .collect()
}

pub fn active_items(html: &str) -> Vec<&str> {
    widget_items(html)
        .into_iter()
        .filter(|item| item.contains("user-switcher-item-active"))
        .collect()
}
