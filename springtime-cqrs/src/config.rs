//! Assembly configuration. [AssemblyConfig] is created with opinionated default values, which can
//! then be overwritten by values from `springtime.json` file under the `cqrs` key, or environment
//! variables prefixed with `SPRINGTIME_CQRS__` (e.g. `SPRINGTIME_CQRS__INSTALL_TRACING_LOGGER`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "SPRINGTIME";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "springtime.json";

/// Media type of JSON responses.
pub const JSON_FORMAT: &str = "application/json";

/// Media type of RFC 7807 problem responses.
pub const PROBLEM_JSON_FORMAT: &str = "application/problem+json";

/// Service id of the default JSON formatter.
pub const JSON_FORMATTER: &str = "formatter.json";

/// A response format an application is able to produce.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AllowedFormat {
    /// Media type, e.g. `application/json`.
    pub format: String,
    /// Charset appended to the `Content-Type` header.
    pub charset: String,
}

impl AllowedFormat {
    pub fn new(format: impl Into<String>, charset: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            charset: charset.into(),
        }
    }
}

/// Default mapping between a format and the service id of its formatter.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct FormatterMapping {
    pub format: String,
    pub formatter: String,
}

impl FormatterMapping {
    pub fn new(format: impl Into<String>, formatter: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            formatter: formatter.into(),
        }
    }
}

/// Configuration used when assembling applications.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct AssemblyConfig {
    /// Should a default tracing logger be installed when assembling an application.
    pub install_tracing_logger: bool,
    /// Formats available for content negotiation, in order of preference.
    pub allowed_formats: Vec<AllowedFormat>,
    /// Formatters used when the application doesn't declare its own.
    pub default_formatters: Vec<FormatterMapping>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            allowed_formats: vec![
                AllowedFormat::new(JSON_FORMAT, "UTF-8"),
                AllowedFormat::new(PROBLEM_JSON_FORMAT, "UTF-8"),
            ],
            default_formatters: vec![
                FormatterMapping::new(JSON_FORMAT, JSON_FORMATTER),
                FormatterMapping::new(PROBLEM_JSON_FORMAT, JSON_FORMATTER),
            ],
        }
    }
}

impl From<OptionalAssemblyConfig> for AssemblyConfig {
    fn from(value: OptionalAssemblyConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            allowed_formats: value.allowed_formats.unwrap_or(default.allowed_formats),
            default_formatters: value
                .default_formatters
                .unwrap_or(default.default_formatters),
        }
    }
}

impl AssemblyConfig {
    /// Loads the config from `springtime.json` and the environment, falling back to defaults for
    /// missing values.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX).separator("__"))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalAssemblyConfigWrapper>())
            .map(|config| config.cqrs.map(|config| config.into()).unwrap_or_default())
    }

    /// Returns the charset configured for given format.
    pub fn charset(&self, format: &str) -> Option<&str> {
        self.allowed_formats
            .iter()
            .find(|allowed| allowed.format == format)
            .map(|allowed| allowed.charset.as_str())
    }
}

#[derive(Deserialize)]
struct OptionalAssemblyConfig {
    install_tracing_logger: Option<bool>,
    allowed_formats: Option<Vec<AllowedFormat>>,
    default_formatters: Option<Vec<FormatterMapping>>,
}

#[derive(Deserialize)]
struct OptionalAssemblyConfigWrapper {
    cqrs: Option<OptionalAssemblyConfig>,
}
