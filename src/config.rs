use reqwest::Url;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::logging::LogFormat;

const LOCAL_CLASSIFIER_URL: &str = "http://localhost:8000/analyze/";

/// Where the service runs, which decides the default classifier endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Deployed,
}

impl FromStr for Environment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Environment::Local),
            "production" | "prod" | "deployed" => Ok(Environment::Deployed),
            other => Err(AppError::ConfigError(format!("Unknown APP_ENV: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub environment: Environment,
    pub classifier_url: Url,
    pub request_timeout: Duration,
    pub page_fetch_timeout: Duration,
    pub idle_dismiss: Duration,
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub cache_key_prefix_chars: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match var("APP_ENV") {
            Some(value) => value.parse()?,
            None => Environment::Local,
        };

        let classifier_url = match (var("CLASSIFIER_URL"), environment) {
            (Some(url), _) => url,
            (None, Environment::Local) => LOCAL_CLASSIFIER_URL.to_string(),
            (None, Environment::Deployed) => {
                return Err(AppError::ConfigError(
                    "CLASSIFIER_URL must be set when APP_ENV is production".to_string(),
                ));
            }
        };
        let classifier_url = Url::parse(&classifier_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid CLASSIFIER_URL: {}", e)))?;

        // Load server configuration with defaults
        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&var, "PORT", 3000u16)?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let request_timeout = Duration::from_secs(parse_or(&var, "REQUEST_TIMEOUT_SECS", 7)?);
        let page_fetch_timeout = Duration::from_secs(parse_or(&var, "PAGE_FETCH_TIMEOUT_SECS", 5)?);
        let idle_dismiss = Duration::from_secs(parse_or(&var, "IDLE_DISMISS_SECS", 10)?);
        if request_timeout.is_zero() || idle_dismiss.is_zero() {
            return Err(AppError::ConfigError(
                "Timeouts must be at least one second".to_string(),
            ));
        }

        let min_text_chars = parse_or(&var, "MIN_TEXT_CHARS", 10)?;
        let max_text_chars = parse_or(&var, "MAX_TEXT_CHARS", 8000)?;
        let cache_key_prefix_chars = parse_or(&var, "CACHE_KEY_PREFIX_CHARS", 1000)?;
        if min_text_chars == 0 || cache_key_prefix_chars == 0 {
            return Err(AppError::ConfigError(
                "MIN_TEXT_CHARS and CACHE_KEY_PREFIX_CHARS must be at least 1".to_string(),
            ));
        }
        if max_text_chars < min_text_chars {
            return Err(AppError::ConfigError(format!(
                "MAX_TEXT_CHARS ({}) is below MIN_TEXT_CHARS ({})",
                max_text_chars, min_text_chars
            )));
        }

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            environment,
            classifier_url,
            request_timeout,
            page_fetch_timeout,
            idle_dismiss,
            min_text_chars,
            max_text_chars,
            cache_key_prefix_chars,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: match var("LOG_FORMAT") {
                Some(value) => value.parse()?,
                None => LogFormat::Pretty,
            },
        })
    }
}

fn parse_or<F, T>(var: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", name, e))),
        None => Ok(default),
    }
}
