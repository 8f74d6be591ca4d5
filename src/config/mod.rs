use std::env;
use std::time::Duration;

use crate::api::Semantics;
use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub mining: MiningSettings,
    pub channel: ChannelConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Remote mining service configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Parameters forwarded with every start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningSettings {
    pub semantics: Semantics,
    pub depth: u8,
    pub breadth: u8,
}

/// Streaming channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// socket.io namespace carrying `mining_status` events
    pub namespace: String,
    /// Silence after which a running session is failed; 0 disables
    pub idle_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Default remote service.
pub const DEFAULT_BASE_URL: &str = "https://arg-llm-api-rag-acebe09e8eeb.herokuapp.com";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = ApiConfig {
            api_key: env::var("ARG_API_KEY").map_err(|_| AppError::Config {
                message: "ARG_API_KEY is required".to_string(),
            })?,
            base_url: env::var("ARG_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };

        let semantics = env::var("ARG_SEMANTICS")
            .unwrap_or_else(|_| "dfquad".to_string())
            .parse::<Semantics>()
            .map_err(|message| AppError::Config { message })?;

        let mining = MiningSettings::new(
            semantics,
            parse_var("ARG_AF_DEPTH", 1)?,
            parse_var("ARG_AF_BREADTH", 2)?,
        )?;

        let channel = ChannelConfig {
            namespace: env::var("CHANNEL_NAMESPACE")
                .unwrap_or_else(|_| ChannelConfig::default().namespace),
            idle_timeout_ms: env::var("CHANNEL_IDLE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600_000),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        Ok(Config {
            api,
            mining,
            channel,
            logging,
            request,
        })
    }
}

impl MiningSettings {
    /// Validated settings: depth in 1..=2, breadth in 1..=4.
    pub fn new(semantics: Semantics, depth: u8, breadth: u8) -> Result<Self, AppError> {
        if !(1..=2).contains(&depth) {
            return Err(AppError::Config {
                message: format!("AF depth must be 1 or 2, got {}", depth),
            });
        }
        if !(1..=4).contains(&breadth) {
            return Err(AppError::Config {
                message: format!("AF breadth must be between 1 and 4, got {}", breadth),
            });
        }
        Ok(Self {
            semantics,
            depth,
            breadth,
        })
    }
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            semantics: Semantics::Dfquad,
            depth: 1,
            breadth: 2,
        }
    }
}

impl ChannelConfig {
    /// Idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            namespace: "/ws/arguments/mine".to_string(),
            idle_timeout_ms: 600_000,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

fn parse_var(name: &str, default: u8) -> Result<u8, AppError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| AppError::Config {
            message: format!("{} must be a small integer, got '{}'", name, raw),
        }),
        Err(_) => Ok(default),
    }
}
