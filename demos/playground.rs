//! Local playground for the user switcher.
//!
//! ```sh
//! USER_SWITCHER_ENABLED=true APP_ENV=local cargo run --example playground
//! ```
//!
//! Open http://127.0.0.1:3000 and pick a user from the widget in the corner.

use axum::{Extension, Router, response::Html, routing::get};
use std::sync::Arc;
use user_switcher::{
    Authenticator, InMemorySessionStore, InMemoryUserSource, SessionConfig, SessionHandle,
    SessionLayer, SwitcherConfig, UserRecord, UserSwitcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    user_switcher::init_tracing();

    let users = InMemoryUserSource::with_users([
        UserRecord::new(1)
            .with_name("Ada Admin")
            .with_attribute("role", "admin"),
        UserRecord::new(2).with_username("grace"),
        UserRecord::new("support-bot").with_email("bot@example.com"),
    ]);

    let switcher = UserSwitcher::builder(SwitcherConfig::from_env())
        .user_source(Arc::new(users))
        .build()?;

    let mut session_config = SessionConfig::from_env();
    // Plain HTTP on localhost.
    session_config.cookie_secure = false;

    let auth = switcher.authenticator();
    let app = Router::new()
        .route(
            "/",
            get(move |Extension(session): Extension<SessionHandle>| {
                let auth = auth.clone();
                async move {
                    let session = session.lock().await;
                    let who = auth
                        .current_identity(&session)
                        .await
                        .map(|identity| identity.to_string())
                        .unwrap_or_else(|| "nobody".to_string());
                    Html(format!(
                        "<!doctype html><html><body><h1>Logged in as {who}</h1></body></html>"
                    ))
                }
            }),
        )
        .layer(switcher.inject_layer())
        .layer(switcher.switch_layer())
        .layer(SessionLayer::new(
            Arc::new(InMemorySessionStore::new()),
            session_config,
        ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
