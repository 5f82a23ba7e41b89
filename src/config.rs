use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::model::BackendConfig;
use crate::rate_limit::RateLimitConfig;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Text model used by optimize, generate and regenerate.
    pub model: BackendConfig,
    /// Image prompt gateway.
    pub gateway: BackendConfig,
    pub rate_limit: RateLimitConfig,
    pub sweep_interval: Duration,
    pub trust_proxy: bool,
    pub max_request_bytes: usize,
    pub cors_allow_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let rate_limit = RateLimitConfig::default();
        Self {
            model: BackendConfig {
                name: "openai".into(),
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
                api_key: None,
                model: DEFAULT_OPENAI_MODEL.into(),
                max_tokens: Some(1000),
                default_temperature: Some(0.7),
                timeout_ms: 30_000,
            },
            gateway: BackendConfig {
                name: "image_gateway".into(),
                base_url: DEFAULT_GATEWAY_BASE_URL.into(),
                api_key: None,
                model: DEFAULT_GATEWAY_MODEL.into(),
                max_tokens: None,
                default_temperature: None,
                timeout_ms: 30_000,
            },
            rate_limit,
            sweep_interval: rate_limit.window,
            trust_proxy: false,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            cors_allow_origin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let timeout_ms = parse_optional_u64("MODEL_TIMEOUT_MS")?.unwrap_or(defaults.model.timeout_ms);

        let model = BackendConfig {
            api_key: parse_string_env("OPENAI_API_KEY"),
            base_url: parse_string_env("OPENAI_BASE_URL").unwrap_or(defaults.model.base_url),
            model: parse_string_env("OPENAI_MODEL").unwrap_or(defaults.model.model),
            max_tokens: match parse_optional_u64("OPENAI_MAX_TOKENS")? {
                Some(v) => Some(u32::try_from(v).map_err(|_| anyhow!("OPENAI_MAX_TOKENS is too large"))?),
                None => defaults.model.max_tokens,
            },
            default_temperature: parse_optional_f32("OPENAI_TEMPERATURE")?
                .or(defaults.model.default_temperature),
            timeout_ms,
            ..defaults.model
        };

        let gateway = BackendConfig {
            api_key: parse_string_env("IMAGE_GATEWAY_API_KEY"),
            base_url: parse_string_env("IMAGE_GATEWAY_BASE_URL").unwrap_or(defaults.gateway.base_url),
            model: parse_string_env("IMAGE_GATEWAY_MODEL").unwrap_or(defaults.gateway.model),
            timeout_ms,
            ..defaults.gateway
        };

        let window = parse_optional_u64("RATE_LIMIT_WINDOW_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.rate_limit.window);
        if window.is_zero() {
            bail!("RATE_LIMIT_WINDOW_MS must be greater than zero");
        }
        let max_requests = match parse_optional_u64("RATE_LIMIT_MAX")? {
            Some(0) => bail!("RATE_LIMIT_MAX must be at least 1"),
            Some(v) => u32::try_from(v).map_err(|_| anyhow!("RATE_LIMIT_MAX is too large"))?,
            None => defaults.rate_limit.max_requests,
        };
        let sweep_interval = parse_optional_u64("RATE_LIMIT_SWEEP_MS")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(window);

        let trust_proxy = parse_bool_env("TRUST_PROXY")?.unwrap_or(false);
        let max_request_bytes = parse_optional_u64("MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
        let cors_allow_origin = parse_string_env("CORS_ALLOW_ORIGIN");

        Ok(Self {
            model,
            gateway,
            rate_limit: RateLimitConfig {
                window,
                max_requests,
            },
            sweep_interval,
            trust_proxy,
            max_request_bytes,
            cors_allow_origin,
        })
    }
}

/// Listen port for the binary; `PORT`, default 8080.
pub fn listen_port() -> Result<u16> {
    match parse_optional_u64("PORT")? {
        Some(port) => u16::try_from(port).map_err(|_| anyhow!("PORT must be between 0 and 65535")),
        None => Ok(8080),
    }
}

fn parse_string_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_optional_f32(var: &str) -> Result<Option<f32>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse::<f32>() {
            Ok(v) if (0.0..=2.0).contains(&v) => Ok(Some(v)),
            _ => Err(anyhow!("{} must be a number between 0 and 2", var)),
        },
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const VARS: &[&str] = &[
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "OPENAI_MAX_TOKENS",
        "OPENAI_TEMPERATURE",
        "OPENAI_BASE_URL",
        "MODEL_TIMEOUT_MS",
        "IMAGE_GATEWAY_API_KEY",
        "IMAGE_GATEWAY_BASE_URL",
        "IMAGE_GATEWAY_MODEL",
        "RATE_LIMIT_WINDOW_MS",
        "RATE_LIMIT_MAX",
        "RATE_LIMIT_SWEEP_MS",
        "TRUST_PROXY",
        "MAX_REQUEST_BYTES",
        "CORS_ALLOW_ORIGIN",
        "PORT",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn parses_environment_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();

        let cfg = AppConfig::from_env().unwrap();
        assert!(cfg.model.api_key.is_none());
        assert_eq!(cfg.model.model, "gpt-3.5-turbo");
        assert_eq!(cfg.model.max_tokens, Some(1000));
        assert_eq!(cfg.model.default_temperature, Some(0.7));
        assert_eq!(cfg.gateway.model, "google/gemini-2.5-flash");
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(60));
        assert_eq!(cfg.rate_limit.max_requests, 10);
        assert_eq!(cfg.sweep_interval, cfg.rate_limit.window);
        assert!(!cfg.trust_proxy);
        assert_eq!(cfg.max_request_bytes, 1_048_576);
        assert_eq!(listen_port().unwrap(), 8080);
    }

    #[test]
    fn parses_full_configuration() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();

        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("OPENAI_MODEL", "gpt-4o-mini");
        std::env::set_var("OPENAI_MAX_TOKENS", "256");
        std::env::set_var("OPENAI_TEMPERATURE", "0.2");
        std::env::set_var("OPENAI_BASE_URL", "http://127.0.0.1:9999/v1");
        std::env::set_var("MODEL_TIMEOUT_MS", "1500");
        std::env::set_var("IMAGE_GATEWAY_API_KEY", "gw-test");
        std::env::set_var("RATE_LIMIT_WINDOW_MS", "1000");
        std::env::set_var("RATE_LIMIT_MAX", "3");
        std::env::set_var("RATE_LIMIT_SWEEP_MS", "250");
        std::env::set_var("TRUST_PROXY", "yes");
        std::env::set_var("MAX_REQUEST_BYTES", "2048");
        std::env::set_var("CORS_ALLOW_ORIGIN", "https://app.example");
        std::env::set_var("PORT", "3001");

        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.model.model, "gpt-4o-mini");
        assert_eq!(cfg.model.max_tokens, Some(256));
        assert_eq!(cfg.model.default_temperature, Some(0.2));
        assert_eq!(cfg.model.base_url, "http://127.0.0.1:9999/v1");
        assert_eq!(cfg.model.timeout_ms, 1500);
        assert_eq!(cfg.gateway.timeout_ms, 1500);
        assert_eq!(cfg.gateway.api_key.as_deref(), Some("gw-test"));
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(1));
        assert_eq!(cfg.rate_limit.max_requests, 3);
        assert_eq!(cfg.sweep_interval, Duration::from_millis(250));
        assert!(cfg.trust_proxy);
        assert_eq!(cfg.max_request_bytes, 2048);
        assert_eq!(cfg.cors_allow_origin.as_deref(), Some("https://app.example"));
        assert_eq!(listen_port().unwrap(), 3001);

        clear();
    }

    #[test]
    fn rejects_malformed_values_naming_the_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();

        std::env::set_var("RATE_LIMIT_MAX", "0");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_MAX"));

        std::env::set_var("RATE_LIMIT_MAX", "ten");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_MAX"));
        std::env::remove_var("RATE_LIMIT_MAX");

        std::env::set_var("TRUST_PROXY", "maybe");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TRUST_PROXY"));
        std::env::remove_var("TRUST_PROXY");

        std::env::set_var("OPENAI_TEMPERATURE", "7");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("OPENAI_TEMPERATURE"));

        clear();
    }
}
