use crate::error::{Result, SwitcherError};
use crate::identity::Identity;
use crate::users::UserSummary;
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATE_NAME: &str = "widget";
const DEFAULT_TEMPLATE: &str = include_str!("widget.hbs");

/// Everything the widget shows for one render.
#[derive(Debug, Clone)]
pub struct WidgetContext {
    pub users: Vec<UserSummary>,
    /// Identity currently acting on the session. While impersonating this is
    /// the impersonated user, never the original one.
    pub current: Option<Identity>,
    pub impersonating: bool,
    /// One-shot error from the previous switch attempt.
    pub error: Option<String>,
    /// Name of the switch parameter used in links.
    pub parameter: String,
}

#[derive(Serialize)]
struct TemplateData<'a> {
    users: Vec<TemplateEntry<'a>>,
    impersonating: bool,
    error: Option<&'a str>,
    stop_href: String,
}

#[derive(Serialize)]
struct TemplateEntry<'a> {
    identity: &'a Identity,
    display_name: &'a str,
    href: String,
    active: bool,
}

/// Renders the user selection widget with Handlebars.
///
/// Values are HTML-escaped by the template engine.
pub struct WidgetRenderer {
    handlebars: Handlebars<'static>,
}

impl WidgetRenderer {
    /// Renderer using the built-in template
    pub fn new() -> Result<Self> {
        Self::with_template(DEFAULT_TEMPLATE)
    }

    /// Renderer using a custom Handlebars template.
    ///
    /// The template receives `users` (each with `identity`, `display_name`,
    /// `href`, `active`), `impersonating`, `error` and `stop_href`.
    pub fn with_template(template: &str) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| SwitcherError::internal(format!("Invalid widget template: {e}")))?;
        Ok(Self { handlebars })
    }

    /// Render the widget. Returns an empty string when there are no users.
    pub fn render(&self, context: &WidgetContext) -> Result<String> {
        if context.users.is_empty() {
            return Ok(String::new());
        }

        let data = TemplateData {
            users: context
                .users
                .iter()
                .map(|user| TemplateEntry {
                    identity: &user.identity,
                    display_name: &user.display_name,
                    href: switch_href(&context.parameter, &user.identity.to_string()),
                    active: context.current.as_ref() == Some(&user.identity),
                })
                .collect(),
            impersonating: context.impersonating,
            error: context.error.as_deref(),
            stop_href: switch_href(&context.parameter, crate::config::STOP_VALUE),
        };

        self.handlebars
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| SwitcherError::internal(format!("Failed to render widget: {e}")))
    }
}

impl std::fmt::Debug for WidgetRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetRenderer").finish_non_exhaustive()
    }
}

fn switch_href(parameter: &str, value: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(parameter, value)
        .finish();
    format!("?{query}")
}
