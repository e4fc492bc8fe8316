use crate::error::SwitcherError;
use crate::policy::AuthorizationRequest;
use crate::session::SessionHandle;
use crate::switcher::UserSwitcher;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, Response, header},
    response::IntoResponse,
};
use futures::future::BoxFuture;
use tower::Service;

const BODY_END: &str = "</body>";

/// Insert `widget` right before the last `</body>` of `html`.
///
/// Returns `None` when there is no closing body tag.
pub fn inject_before_body_end(html: &str, widget: &str) -> Option<String> {
    let at = html.rfind(BODY_END)?;
    let mut out = String::with_capacity(html.len() + widget.len());
    out.push_str(&html[..at]);
    out.push_str(widget);
    out.push_str(&html[at..]);
    Some(out)
}

/// Tower layer that injects the widget into HTML responses
///
/// Only uncompressed `text/html` responses containing `</body>` are
/// rewritten, and only when `auto_inject` is on and the caller passes the
/// authorization policy. Must run inside
/// [`SessionLayer`](crate::session::SessionLayer).
#[derive(Clone)]
pub struct InjectWidgetLayer {
    switcher: UserSwitcher,
}

impl InjectWidgetLayer {
    pub fn new(switcher: UserSwitcher) -> Self {
        Self { switcher }
    }
}

impl<S> tower::Layer<S> for InjectWidgetLayer {
    type Service = InjectWidgetService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectWidgetService {
            inner,
            switcher: self.switcher.clone(),
        }
    }
}

/// Tower service created by [`InjectWidgetLayer`]
#[derive(Clone)]
pub struct InjectWidgetService<S> {
    inner: S,
    switcher: UserSwitcher,
}

impl<S> Service<Request> for InjectWidgetService<S>
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
        let switcher = self.switcher.clone();

        if !switcher.config().auto_inject {
            return Box::pin(inner.call(req));
        }

        let view = AuthorizationRequest::new(&req);
        let handle = req.extensions().get::<SessionHandle>().cloned();

        Box::pin(async move {
            let response = inner.call(req).await?;

            let Some(handle) = handle else {
                return Ok(response);
            };
            if !is_injectable(response.headers()) {
                return Ok(response);
            }

            let (mut parts, body) = response.into_parts();
            let bytes = match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Ok(SwitcherError::internal(format!(
                        "Failed to buffer response body: {e}"
                    ))
                    .into_response());
                }
            };

            let Ok(html) = std::str::from_utf8(&bytes) else {
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            };
            if !html.contains(BODY_END) {
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            }

            let widget = {
                let mut session = handle.lock().await;
                switcher.render_widget(view, &mut session).await
            };
            let widget = match widget {
                Ok(widget) => widget,
                Err(e) => {
                    tracing::error!(
                        target: "user_switcher.widget",
                        error = %e,
                        "Failed to render widget"
                    );
                    String::new()
                }
            };
            if widget.is_empty() {
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            }

            let Some(injected) = inject_before_body_end(html, &widget) else {
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            };

            parts.headers.remove(header::CONTENT_LENGTH);
            tracing::debug!(
                target: "user_switcher.widget.injected",
                bytes = widget.len(),
                "Injected user switcher widget"
            );

            Ok(Response::from_parts(parts, Body::from(injected)))
        })
    }
}

fn is_injectable(headers: &HeaderMap) -> bool {
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("text/html"));

    is_html && !headers.contains_key(header::CONTENT_ENCODING)
}
