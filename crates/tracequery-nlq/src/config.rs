//! Feature configuration.
//!
//! Precedence when loading:
//! 1) built-in defaults
//! 2) JSON config file (optional)
//! 3) environment variables (`TRACEQUERY_NLQ_*`, `OLLAMA_HOST`)
//!
//! followed by [`NlqConfig::validate`]. When the feature is disabled nothing
//! else is checked.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::duration::parse_duration;

pub const SUPPORTED_PROVIDER: &str = "ollama";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5:0.5b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 256;

pub const MAX_TEMPERATURE: f32 = 2.0;

pub const ENABLED_ENV: &str = "TRACEQUERY_NLQ_ENABLED";
pub const PROVIDER_ENV: &str = "TRACEQUERY_NLQ_PROVIDER";
pub const OLLAMA_URL_ENV: &str = "TRACEQUERY_NLQ_OLLAMA_URL";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const OLLAMA_MODEL_ENV: &str = "TRACEQUERY_NLQ_OLLAMA_MODEL";
pub const OLLAMA_TIMEOUT_ENV: &str = "TRACEQUERY_NLQ_OLLAMA_TIMEOUT";
pub const OLLAMA_TEMPERATURE_ENV: &str = "TRACEQUERY_NLQ_OLLAMA_TEMPERATURE";
pub const OLLAMA_MAX_TOKENS_ENV: &str = "TRACEQUERY_NLQ_OLLAMA_MAX_TOKENS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("natural language query is disabled (set enabled: true or TRACEQUERY_NLQ_ENABLED=true)")]
    Disabled,
    #[error("provider is required")]
    MissingProvider,
    #[error("provider {0:?} is not supported (expected \"ollama\")")]
    UnsupportedProvider(String),
    #[error("ollama.server_url is required")]
    MissingServerUrl,
    #[error("ollama.server_url {url:?} is invalid: {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("ollama.model is required")]
    MissingModel,
    #[error("ollama.timeout must be positive")]
    NonPositiveTimeout,
    #[error("ollama.temperature must be between 0.0 and 2.0, got {0}")]
    TemperatureOutOfRange(f32),
    #[error("ollama.max_tokens must be positive")]
    NonPositiveMaxTokens,
    #[error("invalid {var}={value:?}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Top-level natural language query settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlqConfig {
    pub enabled: bool,
    pub provider: String,
    pub ollama: OllamaConfig,
}

impl Default for NlqConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: SUPPORTED_PROVIDER.to_string(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Settings for the Ollama backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub server_url: String,
    pub model: String,
    /// Hard deadline per generation call, written as a duration literal (`"10s"`).
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Whole seconds print as `"<n>s"`; anything finer prints in nanoseconds so
/// the literal reloads to the same value.
fn serialize_duration<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    let literal = if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ns", d.as_nanos())
    };
    serializer.serialize_str(&literal)
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let literal = String::deserialize(deserializer)?;
    parse_duration(&literal).map_err(serde::de::Error::custom)
}

impl NlqConfig {
    /// Check the settings. A disabled config is always valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        match self.provider_name().as_str() {
            "" => return Err(ConfigError::MissingProvider),
            SUPPORTED_PROVIDER => {}
            other => return Err(ConfigError::UnsupportedProvider(other.to_string())),
        }

        self.ollama.validate()
    }

    /// Provider name as matched against supported backends: trimmed and
    /// lowercased, wherever it came from.
    pub fn provider_name(&self) -> String {
        self.provider.trim().to_ascii_lowercase()
    }

    /// Load defaults, then `path` (if any), then environment overrides.
    ///
    /// The result is not validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Read a JSON config file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`NlqConfig::load`]). Blank values count as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(ENABLED_ENV) {
            self.enabled = parse_bool(ENABLED_ENV, &v)?;
        }
        if let Some(v) = get(PROVIDER_ENV) {
            self.provider = v;
        }
        if let Some(v) = get(OLLAMA_URL_ENV).or_else(|| get(OLLAMA_HOST_ENV)) {
            self.ollama.server_url = v;
        }
        if let Some(v) = get(OLLAMA_MODEL_ENV) {
            self.ollama.model = v;
        }
        if let Some(v) = get(OLLAMA_TIMEOUT_ENV) {
            self.ollama.timeout = parse_duration(&v).map_err(|e| ConfigError::Env {
                var: OLLAMA_TIMEOUT_ENV,
                value: v.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = get(OLLAMA_TEMPERATURE_ENV) {
            self.ollama.temperature = v.parse::<f32>().map_err(|e| ConfigError::Env {
                var: OLLAMA_TEMPERATURE_ENV,
                value: v.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = get(OLLAMA_MAX_TOKENS_ENV) {
            self.ollama.max_tokens = v.parse::<u32>().map_err(|e| ConfigError::Env {
                var: OLLAMA_MAX_TOKENS_ENV,
                value: v.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::MissingServerUrl);
        }
        generate_endpoint(&self.server_url)?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout);
        }
        // Written this way so NaN is rejected too.
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::NonPositiveMaxTokens);
        }
        Ok(())
    }
}

// Prefer IPv4 loopback: some local Ollama installs bind 127.0.0.1 only and
// `localhost` may resolve to ::1 first.
const FALLBACK_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Normalize a user-supplied Ollama host: trim, default, add a scheme, drop
/// trailing slashes.
pub fn normalize_ollama_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if host.is_empty() {
        host = FALLBACK_OLLAMA_HOST.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

/// Resolve the `/api/generate` endpoint for a server URL.
pub fn generate_endpoint(server_url: &str) -> Result<Url, ConfigError> {
    let base = normalize_ollama_host(server_url);
    let invalid = |reason: String| ConfigError::InvalidServerUrl {
        url: server_url.to_string(),
        reason,
    };
    let url = Url::parse(&format!("{base}/api/generate")).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
            reason: "expected true|false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn enabled() -> NlqConfig {
        NlqConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let config = NlqConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.ollama.server_url, "http://localhost:11434");
        assert_eq!(config.ollama.timeout, Duration::from_secs(10));
        assert_eq!(config.ollama.temperature, 0.0);
        assert_eq!(config.ollama.max_tokens, 256);
        assert!(enabled().validate().is_ok());
    }

    #[test]
    fn disabled_config_is_always_valid() {
        let config = NlqConfig {
            enabled: false,
            provider: "openai".into(),
            ollama: OllamaConfig {
                server_url: String::new(),
                model: String::new(),
                timeout: Duration::ZERO,
                temperature: 9.0,
                max_tokens: 0,
            },
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_failures() {
        let mut missing_provider = enabled();
        missing_provider.provider = String::new();

        let mut unsupported = enabled();
        unsupported.provider = "openai".into();

        let mut no_url = enabled();
        no_url.ollama.server_url = String::new();

        let mut bad_url = enabled();
        bad_url.ollama.server_url = "http://bad host".into();

        let mut no_model = enabled();
        no_model.ollama.model = "  ".into();

        let mut zero_timeout = enabled();
        zero_timeout.ollama.timeout = Duration::ZERO;

        let mut hot = enabled();
        hot.ollama.temperature = 2.5;

        let mut negative = enabled();
        negative.ollama.temperature = -0.1;

        let mut no_tokens = enabled();
        no_tokens.ollama.max_tokens = 0;

        let cases = [
            (missing_provider, "provider is required"),
            (unsupported, "not supported"),
            (no_url, "server_url is required"),
            (bad_url, "server_url \"http://bad host\" is invalid"),
            (no_model, "model is required"),
            (zero_timeout, "timeout must be positive"),
            (hot, "temperature must be between 0.0 and 2.0"),
            (negative, "temperature must be between 0.0 and 2.0"),
            (no_tokens, "max_tokens must be positive"),
        ];
        for (config, expected) in cases {
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected {expected:?} in {err}"
            );
        }
    }

    #[test]
    fn temperature_bounds_are_inclusive() {
        let mut config = enabled();
        config.ollama.temperature = 2.0;
        assert!(config.validate().is_ok());
        config.ollama.temperature = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENABLED_ENV, "true"),
            (OLLAMA_HOST_ENV, "10.0.0.5:11434"),
            (OLLAMA_MODEL_ENV, "llama3.2"),
            (OLLAMA_TIMEOUT_ENV, "2m30s"),
            (OLLAMA_TEMPERATURE_ENV, "0.2"),
            (OLLAMA_MAX_TOKENS_ENV, " 512 "),
            (PROVIDER_ENV, ""),
        ]);
        let mut config = NlqConfig::default();
        config
            .apply_env_with(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert!(config.enabled);
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.ollama.server_url, "10.0.0.5:11434");
        assert_eq!(config.ollama.model, "llama3.2");
        assert_eq!(config.ollama.timeout, Duration::from_secs(150));
        assert_eq!(config.ollama.temperature, 0.2);
        assert_eq!(config.ollama.max_tokens, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_url_beats_ollama_host() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (OLLAMA_URL_ENV, "http://gpu-box:11434"),
            (OLLAMA_HOST_ENV, "127.0.0.1:11434"),
        ]);
        let mut config = NlqConfig::default();
        config
            .apply_env_with(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.ollama.server_url, "http://gpu-box:11434");
    }

    #[test]
    fn bad_env_values_are_reported() {
        let mut config = NlqConfig::default();
        let err = config
            .apply_env_with(|k| (k == OLLAMA_TIMEOUT_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(OLLAMA_TIMEOUT_ENV));

        let err = config
            .apply_env_with(|k| (k == ENABLED_ENV).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENABLED_ENV, .. }));
    }

    #[test]
    fn parses_json_with_partial_fields() {
        let config: NlqConfig = serde_json::from_str(
            r#"{"enabled": true, "ollama": {"model": "phi3", "timeout": "1500ms"}}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.ollama.model, "phi3");
        assert_eq!(config.ollama.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.ollama.timeout, Duration::from_millis(1500));

        let err = serde_json::from_str::<NlqConfig>(r#"{"ollama": {"timeout": "ten"}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn normalizes_hosts() {
        assert_eq!(normalize_ollama_host(""), FALLBACK_OLLAMA_HOST);
        assert_eq!(normalize_ollama_host("  "), FALLBACK_OLLAMA_HOST);
        assert_eq!(
            normalize_ollama_host("localhost:11434"),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_ollama_host("http://localhost:11434/"),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_ollama_host("https://ollama.internal"),
            "https://ollama.internal"
        );
    }

    #[test]
    fn builds_generate_endpoint() {
        let url = generate_endpoint("http://localhost:11434").unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/api/generate");

        let url = generate_endpoint("10.0.0.5:8080/").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.5:8080/api/generate");

        assert!(matches!(
            generate_endpoint("http://bad host"),
            Err(ConfigError::InvalidServerUrl { .. })
        ));
    }

    #[test]
    fn serialized_timeout_reloads() {
        let config = enabled();
        let text = serde_json::to_string(&config).unwrap();
        let back: NlqConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn sub_millisecond_timeout_reloads() {
        for timeout in [
            Duration::from_micros(500),
            Duration::from_nanos(1),
            Duration::from_millis(1500),
        ] {
            let mut config = enabled();
            config.ollama.timeout = timeout;
            let text = serde_json::to_string(&config).unwrap();
            let back: NlqConfig = serde_json::from_str(&text).unwrap();
            assert_eq!(back.ollama.timeout, timeout, "{text}");
            assert!(back.validate().is_ok(), "{text}");
        }

        let value = serde_json::to_value(enabled()).unwrap();
        assert_eq!(value["ollama"]["timeout"], "10s");
        let mut config = enabled();
        config.ollama.timeout = Duration::from_micros(500);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["ollama"]["timeout"], "500000ns");
    }

    #[test]
    fn provider_case_is_ignored_from_file_and_env() {
        let from_file: NlqConfig =
            serde_json::from_str(r#"{"enabled": true, "provider": " Ollama "}"#).unwrap();
        assert!(from_file.validate().is_ok());
        assert_eq!(from_file.provider_name(), "ollama");

        let mut from_env = enabled();
        from_env
            .apply_env_with(|var| (var == PROVIDER_ENV).then(|| "OLLAMA".to_string()))
            .unwrap();
        assert!(from_env.validate().is_ok());
        assert_eq!(from_env.provider_name(), "ollama");

        let other: NlqConfig =
            serde_json::from_str(r#"{"enabled": true, "provider": "OpenAI"}"#).unwrap();
        assert!(matches!(
            other.validate(),
            Err(ConfigError::UnsupportedProvider(p)) if p == "openai"
        ));
    }
}
