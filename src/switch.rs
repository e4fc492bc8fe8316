//! Switch directive handling.
//!
//! [`SwitchUserLayer`] watches every request for the reserved parameter
//! (`_switch_user` by default). When it is present and the caller is
//! authorized, the layer performs the switch or stop and answers with a
//! redirect to the same path, so the next page renders under the new
//! identity. Unauthorized directives are ignored and the request continues
//! to the application untouched.
//!
//! Must run inside [`SessionLayer`](crate::session::SessionLayer).

use crate::auth::impersonation::Impersonator;
use crate::config::{STOP_VALUE, SwitcherConfig};
use crate::error::SwitcherError;
use crate::identity::Identity;
use crate::policy::{AuthorizationPolicy, AuthorizationRequest};
use crate::session::SessionHandle;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, Method, Response, header},
    response::{IntoResponse, Redirect},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use tower::Service;

/// Session key of the one-shot error shown in the widget after a rejected
/// switch.
pub const FLASH_ERROR_KEY: &str = "user_switcher.error";

/// Largest urlencoded form body inspected for a directive.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// What a request asked the switcher to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchDirective {
    /// End impersonation.
    Stop,
    /// Switch to this identity.
    Impersonate(Identity),
    /// The parameter was present with a value of an unsupported shape
    /// (empty, or bracketed array/map syntax). Ignored, but still answered
    /// with a redirect.
    Unsupported,
}

impl SwitchDirective {
    /// Find the directive for `parameter` in a urlencoded string.
    ///
    /// Returns `None` when the parameter is absent. If it occurs more than
    /// once, the last occurrence wins.
    pub fn from_query(query: &str, parameter: &str) -> Option<Self> {
        let bracketed = format!("{parameter}[");
        url::form_urlencoded::parse(query.as_bytes())
            .filter_map(|(key, value)| {
                if key == parameter {
                    Some(Self::from_value(&value))
                } else if key.starts_with(&bracketed) {
                    Some(Self::Unsupported)
                } else {
                    None
                }
            })
            .last()
    }

    fn from_value(value: &str) -> Self {
        match value {
            STOP_VALUE => Self::Stop,
            "" => Self::Unsupported,
            other => Self::Impersonate(Identity::from_param(other)),
        }
    }
}

/// Tower layer handling switch directives
#[derive(Clone)]
pub struct SwitchUserLayer {
    config: Arc<SwitcherConfig>,
    policy: AuthorizationPolicy,
    impersonator: Impersonator,
}

impl SwitchUserLayer {
    pub fn new(
        config: Arc<SwitcherConfig>,
        policy: AuthorizationPolicy,
        impersonator: Impersonator,
    ) -> Self {
        Self {
            config,
            policy,
            impersonator,
        }
    }
}

impl<S> tower::Layer<S> for SwitchUserLayer {
    type Service = SwitchUserService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SwitchUserService {
            inner,
            config: self.config.clone(),
            policy: self.policy.clone(),
            impersonator: self.impersonator.clone(),
        }
    }
}

/// Tower service created by [`SwitchUserLayer`]
#[derive(Clone)]
pub struct SwitchUserService<S> {
    inner: S,
    config: Arc<SwitcherConfig>,
    policy: AuthorizationPolicy,
    impersonator: Impersonator,
}

impl<S> Service<Request> for SwitchUserService<S>
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

    fn call(&mut self, req: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();
        let policy = self.policy.clone();
        let impersonator = self.impersonator.clone();

        Box::pin(async move {
            let (req, directive) = extract_directive(req, &config.parameter).await;
            let Some(directive) = directive else {
                return inner.call(req).await;
            };

            let Some(handle) = req.extensions().get::<SessionHandle>().cloned() else {
                tracing::warn!(
                    target: "user_switcher.switch",
                    "Switch directive received without a session; is SessionLayer installed?"
                );
                return inner.call(req).await;
            };

            let view = AuthorizationRequest::new(&req);
            let target = req.uri().path().to_string();

            let mut session = handle.lock().await;
            if !policy.can_act_on_request(view, &session).await {
                drop(session);
                tracing::debug!(
                    target: "user_switcher.switch.denied",
                    path = %target,
                    "Switch directive ignored: not authorized"
                );
                return inner.call(req).await;
            }

            let result = match directive {
                SwitchDirective::Stop => impersonator.stop_impersonating(&mut session).await,
                SwitchDirective::Impersonate(identity) => {
                    impersonator.impersonate(&mut session, identity).await
                }
                SwitchDirective::Unsupported => Ok(()),
            };

            let response = match result {
                Ok(()) => Redirect::to(&target).into_response(),
                Err(e) => {
                    tracing::warn!(
                        target: "user_switcher.switch.failed",
                        error = %e,
                        "Switch failed"
                    );
                    failure_response(e, &config, &mut session, &target)
                }
            };

            Ok(response)
        })
    }
}

/// Validation failures become a flashed message and a redirect, except in
/// development environments where every error is returned as-is.
fn failure_response(
    error: SwitcherError,
    config: &SwitcherConfig,
    session: &mut crate::session::Session,
    target: &str,
) -> Response<Body> {
    let development = config.is_development();
    if error.is_validation() && !development {
        session.put(
            FLASH_ERROR_KEY,
            format!("Invalid user identifier: {}", error.message()),
        );
        return Redirect::to(target).into_response();
    }
    error.into_response_with_info(development)
}

/// Look for the directive in the query string, then in a urlencoded form
/// body. The body is buffered only in the latter case and put back.
async fn extract_directive(req: Request, parameter: &str) -> (Request, Option<SwitchDirective>) {
    if let Some(directive) = req
        .uri()
        .query()
        .and_then(|query| SwitchDirective::from_query(query, parameter))
    {
        return (req, Some(directive));
    }

    if !is_small_form(req.method(), req.headers()) {
        return (req, None);
    }

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => {
            let directive = std::str::from_utf8(&bytes)
                .ok()
                .and_then(|form| SwitchDirective::from_query(form, parameter));
            (Request::from_parts(parts, Body::from(bytes)), directive)
        }
        Err(e) => {
            tracing::warn!(
                target: "user_switcher.switch",
                error = %e,
                "Failed to read form body"
            );
            (Request::from_parts(parts, Body::empty()), None)
        }
    }
}

fn is_small_form(method: &Method, headers: &HeaderMap) -> bool {
    if matches!(*method, Method::GET | Method::HEAD) {
        return false;
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    is_form && length.is_some_and(|length| length <= MAX_FORM_BYTES)
}
