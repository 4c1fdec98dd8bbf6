use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub inference: InferenceConfig,
    pub controller: ControllerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct InferenceConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Explicit path to the `kubectl` binary; resolved on `PATH` when unset.
    pub kubectl_path: Option<PathBuf>,
    /// Kube context passed as `--context` when set.
    pub context: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub name_prefix: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub inference_model: Option<String>,
    pub kubectl_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-3-5-sonnet-20241022".to_string(),
                max_tokens: 1000,
                timeout_secs: 60,
                max_retries: 2,
            },
            controller: ControllerConfig {
                kubectl_path: None,
                context: None,
                timeout_secs: 120,
                max_retries: 3,
                name_prefix: "bucket".to_string(),
            },
            server: ServerConfig { host: "0.0.0.0".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl InferenceConfig {
    /// Returns the configured API key, or `inference.api_key is required` when
    /// it is missing or blank.
    pub fn require_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.api_key.as_ref().filter(|key| !key.expose_secret().trim().is_empty()).ok_or_else(
            || {
                ConfigError::Validation(
                    "inference.api_key is required (set ACKBUCKET_INFERENCE_API_KEY or ANTHROPIC_API_KEY)"
                        .to_string(),
                )
            },
        )
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ackbucket.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(inference) = patch.inference {
            if let Some(api_key) = inference.api_key {
                self.inference.api_key = Some(SecretString::from(api_key));
            }
            if let Some(base_url) = inference.base_url {
                self.inference.base_url = base_url;
            }
            if let Some(model) = inference.model {
                self.inference.model = model;
            }
            if let Some(max_tokens) = inference.max_tokens {
                self.inference.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = inference.timeout_secs {
                self.inference.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = inference.max_retries {
                self.inference.max_retries = max_retries;
            }
        }

        if let Some(controller) = patch.controller {
            if let Some(kubectl_path) = controller.kubectl_path {
                self.controller.kubectl_path = Some(kubectl_path);
            }
            if let Some(context) = controller.context {
                self.controller.context = Some(context);
            }
            if let Some(timeout_secs) = controller.timeout_secs {
                self.controller.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = controller.max_retries {
                self.controller.max_retries = max_retries;
            }
            if let Some(name_prefix) = controller.name_prefix {
                self.controller.name_prefix = name_prefix;
            }
        }

        if let Some(server) = patch.server {
            if let Some(host) = server.host {
                self.server.host = host;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let api_key =
            read_env("ACKBUCKET_INFERENCE_API_KEY").or_else(|| read_env("ANTHROPIC_API_KEY"));
        if let Some(value) = api_key {
            self.inference.api_key = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("ACKBUCKET_INFERENCE_BASE_URL") {
            self.inference.base_url = value;
        }
        if let Some(value) = read_env("ACKBUCKET_INFERENCE_MODEL") {
            self.inference.model = value;
        }
        if let Some(value) = read_env("ACKBUCKET_INFERENCE_MAX_TOKENS") {
            self.inference.max_tokens = parse_u32("ACKBUCKET_INFERENCE_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("ACKBUCKET_INFERENCE_TIMEOUT_SECS") {
            self.inference.timeout_secs = parse_u64("ACKBUCKET_INFERENCE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ACKBUCKET_INFERENCE_MAX_RETRIES") {
            self.inference.max_retries = parse_u32("ACKBUCKET_INFERENCE_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("ACKBUCKET_CONTROLLER_KUBECTL_PATH") {
            self.controller.kubectl_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("ACKBUCKET_CONTROLLER_CONTEXT") {
            self.controller.context = Some(value);
        }
        if let Some(value) = read_env("ACKBUCKET_CONTROLLER_TIMEOUT_SECS") {
            self.controller.timeout_secs =
                parse_u64("ACKBUCKET_CONTROLLER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ACKBUCKET_CONTROLLER_MAX_RETRIES") {
            self.controller.max_retries = parse_u32("ACKBUCKET_CONTROLLER_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ACKBUCKET_CONTROLLER_NAME_PREFIX") {
            self.controller.name_prefix = value;
        }

        if let Some(value) = read_env("ACKBUCKET_SERVER_HOST") {
            self.server.host = value;
        }
        if let Some(value) = read_env("ACKBUCKET_SERVER_PORT") {
            self.server.port = parse_u16("ACKBUCKET_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("ACKBUCKET_LOGGING_LEVEL").or_else(|| read_env("ACKBUCKET_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ACKBUCKET_LOGGING_FORMAT").or_else(|| read_env("ACKBUCKET_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(model) = overrides.inference_model {
            self.inference.model = model;
        }
        if let Some(kubectl_path) = overrides.kubectl_path {
            self.controller.kubectl_path = Some(kubectl_path);
        }
        if let Some(host) = overrides.server_host {
            self.server.host = host;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_inference(&self.inference)?;
        validate_controller(&self.controller)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ackbucket.toml"), PathBuf::from("config/ackbucket.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_inference(inference: &InferenceConfig) -> Result<(), ConfigError> {
    let base_url = inference.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "inference.base_url must start with http:// or https://".to_string(),
        ));
    }

    if inference.model.trim().is_empty() {
        return Err(ConfigError::Validation("inference.model must not be empty".to_string()));
    }

    if inference.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "inference.max_tokens must be greater than zero".to_string(),
        ));
    }

    if inference.timeout_secs == 0 || inference.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "inference.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_controller(controller: &ControllerConfig) -> Result<(), ConfigError> {
    if controller.timeout_secs == 0 || controller.timeout_secs > 3600 {
        return Err(ConfigError::Validation(
            "controller.timeout_secs must be in range 1..=3600".to_string(),
        ));
    }

    if controller.max_retries == 0 || controller.max_retries > crate::creator::MAX_RETRIES_CAP {
        return Err(ConfigError::Validation(format!(
            "controller.max_retries must be in range 1..={}",
            crate::creator::MAX_RETRIES_CAP
        )));
    }

    let prefix = controller.name_prefix.as_str();
    let prefix_ok = !prefix.is_empty()
        && prefix.len() <= 40
        && prefix.starts_with(|ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        && prefix.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !prefix_ok {
        return Err(ConfigError::Validation(
            "controller.name_prefix must be 1-40 lowercase letters, digits, or hyphens and start with a letter or digit"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.host.trim().is_empty() {
        return Err(ConfigError::Validation("server.host must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    inference: Option<InferencePatch>,
    controller: Option<ControllerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct InferencePatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ControllerPatch {
    kubectl_path: Option<PathBuf>,
    context: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    name_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
