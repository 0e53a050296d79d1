//! Configuration management for the AI proxy server.
//!
//! All settings come from environment variables (a `.env` file is loaded by
//! the binary before [`AppConfig::from_env`] runs).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, CORS)
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream endpoint URLs
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Keys held by the server itself
    #[serde(default)]
    pub keys: ServerKeys,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Optional upstream request timeout in seconds. `None` leaves calls
    /// bounded only by the transport.
    #[serde(default)]
    pub upstream_timeout_secs: Option<u64>,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Upstream chat endpoints, one per provider route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_openai_url")]
    pub openai_url: String,

    #[serde(default = "default_anthropic_url")]
    pub anthropic_url: String,

    #[serde(default = "default_groq_url")]
    pub groq_url: String,

    /// Base URL of the local Ollama server (`/api/chat` is appended)
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            openai_url: default_openai_url(),
            anthropic_url: default_anthropic_url(),
            groq_url: default_groq_url(),
            ollama_base_url: default_ollama_base_url(),
        }
    }
}

impl UpstreamConfig {
    /// Full URL of the Ollama chat endpoint.
    pub fn ollama_chat_url(&self) -> String {
        format!("{}/api/chat", self.ollama_base_url.trim_end_matches('/'))
    }
}

/// API keys configured on the server. These always take precedence over
/// keys captured from the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerKeys {
    #[serde(default)]
    pub openai: Option<String>,
    #[serde(default)]
    pub anthropic: Option<String>,
    #[serde(default)]
    pub groq: Option<String>,
    #[serde(default)]
    pub custom: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7070
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:8080".to_string()]
}

fn default_verify_ssl() -> bool {
    true
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_groq_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            keys: ServerKeys::default(),
            verify_ssl: default_verify_ssl(),
            upstream_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; malformed numeric values are
    /// reported as errors rather than silently ignored.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ai_proxy_rust::core::config::AppConfig;
    ///
    /// let config = AppConfig::from_env().expect("invalid configuration");
    /// println!("listening on {}", config.server.port);
    /// ```
    pub fn from_env() -> Result<Self> {
        let mut config = AppConfig::default();

        if let Some(host) = env_string("HOST") {
            config.server.host = host;
        }

        if let Some(port) = env_string("PORT") {
            config.server.port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        if let Some(origins) = env_string("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(verify_ssl) = env_string("VERIFY_SSL") {
            config.verify_ssl = str_to_bool(&verify_ssl);
        }

        if let Some(timeout) = env_string("UPSTREAM_TIMEOUT_SECS") {
            let secs = timeout
                .parse::<u64>()
                .with_context(|| format!("Invalid UPSTREAM_TIMEOUT_SECS value: {}", timeout))?;
            config.upstream_timeout_secs = Some(secs);
        }

        if let Some(url) = env_string("OPENAI_API_URL") {
            config.upstream.openai_url = url;
        }
        if let Some(url) = env_string("ANTHROPIC_API_URL") {
            config.upstream.anthropic_url = url;
        }
        if let Some(url) = env_string("GROQ_API_URL") {
            config.upstream.groq_url = url;
        }
        if let Some(url) = env_string("OLLAMA_BASE_URL") {
            config.upstream.ollama_base_url = url;
        }

        config.keys = ServerKeys {
            openai: env_string("OPENAI_API_KEY"),
            anthropic: env_string("ANTHROPIC_API_KEY"),
            groq: env_string("GROQ_API_KEY"),
            custom: env_string("CUSTOM_API_KEY"),
        };

        Ok(config)
    }
}

/// Read an environment variable, treating empty values as unset.
fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
