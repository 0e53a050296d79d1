//! Provider route table and API key resolution.
//!
//! Each client route maps to one [`ProviderSpec`]: the wire dialect, where
//! the upstream lives, where its key comes from and which body fields it
//! requires. The table is built once from configuration.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Map, Value};

use crate::core::config::{ServerKeys, UpstreamConfig};
use crate::core::error::{AppError, Result};
use crate::transformer::ApiType;

/// Client-facing provider routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderRoute {
    OpenAI,
    Groq,
    Anthropic,
    Ollama,
    Custom,
}

impl ProviderRoute {
    pub const ALL: [ProviderRoute; 5] = [
        ProviderRoute::OpenAI,
        ProviderRoute::Groq,
        ProviderRoute::Anthropic,
        ProviderRoute::Ollama,
        ProviderRoute::Custom,
    ];

    /// Position in [`ProviderRoute::ALL`] and in the route table.
    fn index(self) -> usize {
        self as usize
    }

    /// Label used in logs and metrics.
    pub fn name(self) -> &'static str {
        match self {
            ProviderRoute::OpenAI => "openai",
            ProviderRoute::Groq => "groq",
            ProviderRoute::Anthropic => "anthropic",
            ProviderRoute::Ollama => "ollama",
            ProviderRoute::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a route may find an API key. Sources are tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Configured on the server
    ServerHeld,
    /// Captured once from a client via `/api-keys`
    ClientCaptured,
    /// Sent inside the chat request itself (`apiKey`)
    RequestEmbedded,
}

/// Where a route sends its upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Fixed(String),
    /// Taken from the request's `apiEndpoint`
    FromRequest,
}

/// Static description of one provider route.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub route: ProviderRoute,
    pub api_type: ApiType,
    pub endpoint: Endpoint,
    pub key_sources: Vec<KeySource>,
    pub fixed_fields: Map<String, Value>,
}

impl ProviderSpec {
    /// Resolve the upstream URL for a call.
    pub fn endpoint_url(&self, requested: Option<&str>) -> Result<String> {
        match &self.endpoint {
            Endpoint::Fixed(url) => Ok(url.clone()),
            Endpoint::FromRequest => requested
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from)
                .ok_or_else(|| AppError::BadRequest("apiEndpoint is required".to_string())),
        }
    }
}

/// Server-held keys plus keys captured from clients.
#[derive(Debug, Default)]
struct KeyStore {
    server: ServerKeys,
    captured: DashMap<ProviderRoute, String>,
}

impl KeyStore {
    fn server_key(&self, route: ProviderRoute) -> Option<&str> {
        let key = match route {
            ProviderRoute::OpenAI => &self.server.openai,
            ProviderRoute::Groq => &self.server.groq,
            ProviderRoute::Anthropic => &self.server.anthropic,
            ProviderRoute::Custom => &self.server.custom,
            ProviderRoute::Ollama => return None,
        };
        key.as_deref().filter(|k| !k.is_empty())
    }

    fn captured_key(&self, route: ProviderRoute) -> Option<String> {
        self.captured.get(&route).map(|k| k.value().clone())
    }
}

/// Service resolving provider routes and their credentials.
#[derive(Clone)]
pub struct ProviderService {
    specs: Arc<Vec<ProviderSpec>>,
    keys: Arc<KeyStore>,
}

impl ProviderService {
    pub fn new(upstream: &UpstreamConfig, server_keys: ServerKeys) -> Self {
        let mut ollama_fields = Map::new();
        ollama_fields.insert("context".to_string(), json!(""));

        let shared = vec![KeySource::ServerHeld, KeySource::ClientCaptured];
        let specs = vec![
            ProviderSpec {
                route: ProviderRoute::OpenAI,
                api_type: ApiType::Default,
                endpoint: Endpoint::Fixed(upstream.openai_url.clone()),
                key_sources: shared.clone(),
                fixed_fields: Map::new(),
            },
            ProviderSpec {
                route: ProviderRoute::Groq,
                api_type: ApiType::Default,
                endpoint: Endpoint::Fixed(upstream.groq_url.clone()),
                key_sources: shared.clone(),
                fixed_fields: Map::new(),
            },
            ProviderSpec {
                route: ProviderRoute::Anthropic,
                api_type: ApiType::Anthropic,
                endpoint: Endpoint::Fixed(upstream.anthropic_url.clone()),
                key_sources: shared,
                fixed_fields: Map::new(),
            },
            ProviderSpec {
                route: ProviderRoute::Ollama,
                api_type: ApiType::Default,
                endpoint: Endpoint::Fixed(upstream.ollama_chat_url()),
                key_sources: Vec::new(),
                fixed_fields: ollama_fields,
            },
            // The caller's own apiKey wins; CUSTOM_API_KEY only fills in
            // when the request carries none.
            ProviderSpec {
                route: ProviderRoute::Custom,
                api_type: ApiType::Default,
                endpoint: Endpoint::FromRequest,
                key_sources: vec![KeySource::RequestEmbedded, KeySource::ServerHeld],
                fixed_fields: Map::new(),
            },
        ];

        tracing::info!(
            routes = specs.len(),
            openai_key = server_keys.openai.is_some(),
            groq_key = server_keys.groq.is_some(),
            anthropic_key = server_keys.anthropic.is_some(),
            custom_key = server_keys.custom.is_some(),
            "Provider routes initialized"
        );

        Self {
            specs: Arc::new(specs),
            keys: Arc::new(KeyStore {
                server: server_keys,
                captured: DashMap::new(),
            }),
        }
    }

    /// Get the spec for `route`.
    pub fn spec(&self, route: ProviderRoute) -> &ProviderSpec {
        &self.specs[route.index()]
    }

    /// Resolve the key for `route` from its ordered key sources.
    ///
    /// Returns `None` when no source yields a non-empty key.
    pub fn resolve_key(&self, route: ProviderRoute, request_key: Option<&str>) -> Option<String> {
        self.spec(route).key_sources.iter().find_map(|source| match source {
            KeySource::ServerHeld => self.keys.server_key(route).map(String::from),
            KeySource::ClientCaptured => self.keys.captured_key(route),
            KeySource::RequestEmbedded => request_key
                .filter(|k| !k.is_empty())
                .map(String::from),
        })
    }

    /// Store a client-supplied key unless one is already known for `route`.
    ///
    /// Returns whether the key was stored.
    pub fn capture_key(&self, route: ProviderRoute, key: &str) -> bool {
        if key.is_empty() || self.keys.server_key(route).is_some() {
            return false;
        }

        let stored = match self.keys.captured.entry(route) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(key.to_string());
                true
            }
        };

        if stored {
            tracing::info!(provider = %route, "Captured client API key");
        }
        stored
    }

    /// Whether any key is currently resolvable for `route` without a
    /// request-embedded key.
    pub fn has_key(&self, route: ProviderRoute) -> bool {
        self.resolve_key(route, None).is_some()
    }
}
