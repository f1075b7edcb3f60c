use crate::error::{Result, RewriteError};
use crate::rewrite::{HandlerKind, HandlerParams};
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy server configuration
    pub proxy: ProxyServerConfig,
    /// Admin API configuration
    pub api: ApiServerConfig,
    /// Logging configuration
    pub log: LogConfig,
    /// Handlers registered at startup
    pub handlers: Vec<HandlerDefinition>,
}

#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// Port for the proxy server (default: 8080)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Request timeout in seconds
    pub request_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Whether the admin API is started
    pub enabled: bool,
    /// Port for the admin API (default: 8081)
    pub port: u16,
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

/// A handler to build through the factory at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDefinition {
    pub type_name: String,
    pub params: HandlerParams,
}

impl HandlerDefinition {
    /// Parse `TypeName?key=value&key=value`
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (type_name, query) = raw.split_once('?').unwrap_or((raw, ""));
        let type_name = type_name.trim();

        if type_name.is_empty() {
            return Err(RewriteError::InvalidConfig(format!(
                "REWRITE_HANDLERS entry is missing a handler type: {}",
                raw
            )));
        }

        Ok(Self {
            type_name: type_name.to_string(),
            params: HandlerParams::parse(query),
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            proxy: ProxyServerConfig {
                port: get_env_or("PROXY_PORT", "8080").parse().map_err(|_| {
                    RewriteError::InvalidConfig("PROXY_PORT must be a valid port number".into())
                })?,
                host: get_env_or("PROXY_HOST", "0.0.0.0"),
                connect_timeout: get_env_or("PROXY_CONNECT_TIMEOUT", "10")
                    .parse()
                    .unwrap_or(10),
                request_timeout: get_env_or("PROXY_REQUEST_TIMEOUT", "30")
                    .parse()
                    .unwrap_or(30),
            },
            api: ApiServerConfig {
                enabled: get_env_or("API_ENABLED", "true").parse().unwrap_or(true),
                port: get_env_or("API_PORT", "8081").parse().map_err(|_| {
                    RewriteError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "127.0.0.1"),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
            handlers: parse_handlers(&get_env_or("REWRITE_HANDLERS", ""))?,
        })
    }

    /// Get the proxy server address
    pub fn proxy_addr(&self) -> String {
        format!("{}:{}", self.proxy.host, self.proxy.port)
    }

    /// Get the admin API address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Split `;`-separated handler definitions, ignoring blank entries
///
/// A `;` only starts a new definition when a known handler type follows it,
/// so parameter values such as scripts may contain unencoded semicolons.
fn parse_handlers(raw: &str) -> Result<Vec<HandlerDefinition>> {
    let mut entries: Vec<String> = Vec::new();

    for segment in raw.split(';') {
        match entries.last_mut() {
            Some(current) if !current.trim().is_empty() && !starts_with_handler_type(segment) => {
                current.push(';');
                current.push_str(segment);
            }
            _ => entries.push(segment.to_string()),
        }
    }

    entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| HandlerDefinition::parse(entry))
        .collect()
}

fn starts_with_handler_type(segment: &str) -> bool {
    let segment = segment.trim_start();
    let type_name = segment.split_once('?').map_or(segment, |(name, _)| name);
    HandlerKind::from_name(type_name.trim()).is_some()
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
