//! User switcher configuration.
//!
//! Configuration is an explicit object handed to every component at
//! construction time. It can be deserialized (any serde format), loaded from
//! environment variables, or assembled with [`SwitcherConfigBuilder`].
//!
//! Malformed values never raise: a non-boolean `enabled` reads as `false`
//! and an `environments` value that is neither a string nor a list of
//! strings denies every environment.

use crate::policy::{AuthorizationCallback, AuthorizationCheck};
use crate::utils::get_env_with_prefix;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Default name of the request parameter carrying the switch directive.
pub const DEFAULT_PARAMETER: &str = "_switch_user";

/// Directive value that ends impersonation.
pub const STOP_VALUE: &str = "_stop";

/// Environments in which switching is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedEnvironments {
    /// `*`: every environment.
    Any,
    /// Exact environment names.
    Only(Vec<String>),
    /// The configured value had an unsupported shape; nothing is allowed.
    Invalid,
}

impl AllowedEnvironments {
    /// Parse the textual form: `*` or a comma-separated list.
    pub fn parse(value: &str) -> Self {
        if value == "*" {
            return Self::Any;
        }
        Self::Only(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether `environment` is in the allowed set.
    pub fn allows(&self, environment: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(names) => names.iter().any(|name| name == environment),
            Self::Invalid => false,
        }
    }
}

impl Default for AllowedEnvironments {
    fn default() -> Self {
        Self::Only(vec!["local".to_string(), "testing".to_string()])
    }
}

impl<'de> Deserialize<'de> for AllowedEnvironments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Self::parse(&s),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::Only)
                .unwrap_or(Self::Invalid),
            _ => Self::Invalid,
        })
    }
}

impl Serialize for AllowedEnvironments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Any => serializer.serialize_str("*"),
            Self::Only(names) => names.serialize(serializer),
            Self::Invalid => serializer.serialize_none(),
        }
    }
}

/// Configuration for the user switcher
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwitcherConfig {
    /// Master switch. Only a literal boolean `true` enables switching.
    #[serde(default, deserialize_with = "strict_bool")]
    pub enabled: bool,

    /// Environments in which the config-based rule allows switching
    #[serde(default)]
    pub environments: AllowedEnvironments,

    /// Inject the widget into HTML responses automatically
    #[serde(default = "default_auto_inject")]
    pub auto_inject: bool,

    /// Name of the current runtime environment (`APP_ENV`)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Environments where validation errors propagate instead of redirecting
    #[serde(default = "default_development_environments")]
    pub development_environments: Vec<String>,

    /// Request parameter carrying the switch directive
    #[serde(default = "default_parameter")]
    pub parameter: String,

    /// Custom authorization check. When set it alone decides who may switch.
    #[serde(skip)]
    pub authorization: Option<AuthorizationCallback>,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            environments: AllowedEnvironments::default(),
            auto_inject: default_auto_inject(),
            environment: default_environment(),
            development_environments: default_development_environments(),
            parameter: default_parameter(),
            authorization: None,
        }
    }
}

impl SwitcherConfig {
    /// Create a new SwitcherConfig builder
    pub fn builder() -> SwitcherConfigBuilder {
        SwitcherConfigBuilder::new()
    }

    /// Load configuration from environment variables
    ///
    /// - `USER_SWITCHER_ENABLED`: only `true` enables switching (default: false)
    /// - `USER_SWITCHER_ENVIRONMENTS`: `*` or comma list (default: `local,testing`)
    /// - `USER_SWITCHER_AUTO_INJECT`: inject the widget (default: true)
    /// - `APP_ENV`: current runtime environment (default: `production`)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("ENABLED") {
            config.enabled = enabled.parse().unwrap_or(false);
        }

        if let Some(environments) = get_env_with_prefix("ENVIRONMENTS") {
            config.environments = AllowedEnvironments::parse(&environments);
        }

        if let Some(auto_inject) = get_env_with_prefix("AUTO_INJECT") {
            config.auto_inject = auto_inject.parse().unwrap_or(true);
        }

        if let Some(environment) = get_env_with_prefix("APP_ENV") {
            config.environment = environment;
        }

        config
    }

    /// The config-based rule: enabled and running in an allowed environment.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.environments.allows(&self.environment)
    }

    /// Whether switching is globally available.
    ///
    /// A configured authorization check takes over from the config-based
    /// rule, so switching is available whenever one is present.
    pub fn is_switching_enabled(&self) -> bool {
        self.authorization.is_some() || self.is_enabled()
    }

    /// Whether validation errors should propagate instead of redirecting.
    pub fn is_development(&self) -> bool {
        self.development_environments
            .iter()
            .any(|env| env == &self.environment)
    }
}

fn strict_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

fn default_auto_inject() -> bool {
    true
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_development_environments() -> Vec<String> {
    vec!["local".to_string()]
}

fn default_parameter() -> String {
    DEFAULT_PARAMETER.to_string()
}

/// Builder for SwitcherConfig
#[must_use = "builder does nothing until you call build()"]
pub struct SwitcherConfigBuilder {
    config: SwitcherConfig,
}

impl SwitcherConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SwitcherConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn environments(mut self, environments: AllowedEnvironments) -> Self {
        self.config.environments = environments;
        self
    }

    /// Allow every environment (`*`)
    pub fn any_environment(mut self) -> Self {
        self.config.environments = AllowedEnvironments::Any;
        self
    }

    pub fn auto_inject(mut self, auto_inject: bool) -> Self {
        self.config.auto_inject = auto_inject;
        self
    }

    /// Set the current runtime environment name
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn development_environments(mut self, environments: Vec<String>) -> Self {
        self.config.development_environments = environments;
        self
    }

    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.config.parameter = parameter.into();
        self
    }

    /// Install a custom authorization check
    pub fn authorize_with<C>(mut self, check: C) -> Self
    where
        C: AuthorizationCheck + 'static,
    {
        self.config.authorization = Some(AuthorizationCallback::new(check));
        self
    }

    pub fn build(self) -> SwitcherConfig {
        self.config
    }
}

impl Default for SwitcherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
