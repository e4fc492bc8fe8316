use super::{Session, SessionConfig, SessionHandle};
use crate::traits::session::SessionStore;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, Response, header},
};
use cookie::{Cookie, SameSite};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower::Service;

type SessionLocks = DashMap<String, Arc<Mutex<()>>>;

/// Tower layer that loads and persists the caller's session
///
/// Requests that present the same session cookie are handled one at a time:
/// the layer holds a per-session lock from load to save, so two concurrent
/// switch requests cannot both observe "not impersonating" and both write an
/// original identity.
#[derive(Clone)]
pub struct SessionLayer {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    locks: Arc<SessionLocks>,
}

impl SessionLayer {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<S> tower::Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            config: self.config.clone(),
            locks: self.locks.clone(),
        }
    }
}

/// Tower service created by [`SessionLayer`]
#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    locks: Arc<SessionLocks>,
}

impl<S> Service<Request> for SessionService<S>
where
    S: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let store = self.store.clone();
        let config = self.config.clone();
        let locks = self.locks.clone();

        Box::pin(async move {
            let cookie_id = session_id_from_headers(req.headers(), &config.cookie_name);
            let guard = match &cookie_id {
                Some(id) => Some(acquire(&locks, id).await),
                None => None,
            };

            let session = load_session(store.as_ref(), cookie_id.as_deref(), &config).await;
            let handle = SessionHandle::new(session);
            req.extensions_mut().insert(handle.clone());

            let mut response = inner.call(req).await?;

            persist_session(store.as_ref(), &handle, &config, &mut response).await;

            drop(guard);
            if let Some(id) = cookie_id {
                locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
            }

            Ok(response)
        })
    }
}

async fn acquire(locks: &SessionLocks, session_id: &str) -> OwnedMutexGuard<()> {
    let lock = locks
        .entry(session_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    lock.lock_owned().await
}

async fn load_session(
    store: &dyn SessionStore,
    cookie_id: Option<&str>,
    config: &SessionConfig,
) -> Session {
    let Some(id) = cookie_id else {
        return Session::new(config.ttl());
    };

    match store.load(id).await {
        Ok(Some(data)) => Session::from_stored(id, data),
        Ok(None) => Session::new(config.ttl()),
        Err(e) => {
            tracing::warn!(
                target: "user_switcher.session",
                error = %e,
                "Failed to load session, starting a fresh one"
            );
            Session::new(config.ttl())
        }
    }
}

async fn persist_session(
    store: &dyn SessionStore,
    handle: &SessionHandle,
    config: &SessionConfig,
    response: &mut Response<Body>,
) {
    let mut session = handle.lock().await;

    // Untouched fresh sessions are not worth a store entry or a cookie.
    if session.loaded_id().is_none() && !session.is_modified() {
        return;
    }

    let ttl = config.ttl();
    session.data_mut().extend(ttl);

    if session.id_rotated() {
        if let Some(old_id) = session.loaded_id() {
            if let Err(e) = store.delete(old_id).await {
                tracing::warn!(
                    target: "user_switcher.session",
                    error = %e,
                    "Failed to delete rotated session"
                );
            }
        }
    }

    if let Err(e) = store.save(session.id(), session.data().clone()).await {
        tracing::error!(
            target: "user_switcher.session",
            error = %e,
            "Failed to save session"
        );
        return;
    }

    if session.id_rotated() {
        set_session_cookie(response, session.id(), config);
    }
}

fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn set_session_cookie(response: &mut Response<Body>, session_id: &str, config: &SessionConfig) {
    let mut builder = Cookie::build((config.cookie_name.clone(), session_id.to_string()))
        .path(config.cookie_path.clone())
        .http_only(config.cookie_http_only)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::seconds(config.ttl_seconds as i64));

    if let Some(domain) = &config.cookie_domain {
        builder = builder.domain(domain.clone());
    }

    match HeaderValue::from_str(&builder.build().to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => {
            tracing::error!(
                target: "user_switcher.session",
                error = %e,
                "Failed to encode session cookie"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::traits::session::SessionData;
    use axum::{Extension, Router, routing::get};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: InMemorySessionStore) -> Router {
        Router::new()
            .route(
                "/write",
                get(|Extension(session): Extension<SessionHandle>| async move {
                    session.lock().await.put("greeting", "hello");
                    "ok"
                }),
            )
            .route(
                "/rotate",
                get(|Extension(session): Extension<SessionHandle>| async move {
                    session.lock().await.regenerate_id();
                    "ok"
                }),
            )
            .route(
                "/read",
                get(|Extension(session): Extension<SessionHandle>| async move {
                    let guard = session.lock().await;
                    guard.get("greeting").unwrap_or("none").to_string()
                }),
            )
            .layer(SessionLayer::new(Arc::new(store), SessionConfig::default()))
    }

    fn request(uri: &str, cookie: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(id) = cookie {
            builder = builder.header(header::COOKIE, format!("user_switcher_session={id}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn cookie_value(response: &Response<Body>) -> Option<String> {
        let raw = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        Cookie::parse(raw.to_string())
            .ok()
            .map(|c| c.value().to_string())
    }

    #[tokio::test]
    async fn test_untouched_session_sets_no_cookie() {
        let store = InMemorySessionStore::new();
        let response = app(store.clone())
            .oneshot(request("/read", None))
            .await
            .unwrap();

        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_modified_session_is_saved_with_cookie() {
        let store = InMemorySessionStore::new();
        let response = app(store.clone())
            .oneshot(request("/write", None))
            .await
            .unwrap();

        let id = cookie_value(&response).expect("session cookie");
        let data = store.load(&id).await.unwrap().unwrap();
        assert_eq!(data.values.get("greeting"), Some(&"hello".to_string()));
    }

    #[tokio::test]
    async fn test_existing_session_is_loaded() {
        let store = InMemorySessionStore::new();
        let mut data = SessionData::new(Duration::from_secs(60));
        data.values.insert("greeting".to_string(), "stored".to_string());
        store.save("known", data).await.unwrap();

        let response = app(store.clone())
            .oneshot(request("/read", Some("known")))
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"stored");
    }

    #[tokio::test]
    async fn test_rotation_replaces_stored_session() {
        let store = InMemorySessionStore::new();
        store
            .save("before", SessionData::new(Duration::from_secs(60)))
            .await
            .unwrap();

        let response = app(store.clone())
            .oneshot(request("/rotate", Some("before")))
            .await
            .unwrap();

        let new_id = cookie_value(&response).expect("rotated cookie");
        assert_ne!(new_id, "before");
        assert!(!store.contains("before").await);
        assert!(store.contains(&new_id).await);
    }

    #[test]
    fn test_session_id_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; user_switcher_session=abc123"),
        );
        assert_eq!(
            session_id_from_headers(&headers, "user_switcher_session"),
            Some("abc123".to_string())
        );
        assert_eq!(session_id_from_headers(&headers, "other"), None);
    }
}
