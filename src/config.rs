use crate::models::Language;
use anyhow::{Context, Result, bail};
use std::net::SocketAddr;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";
pub const DEFAULT_RELAY_URL: &str = "http://localhost:8000/chat";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Process-wide settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Fallback credential when a request brings none.
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub vision_model: String,
    pub relay_url: String,
    pub use_relay: bool,
    pub language: Language,
    pub bind_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let use_relay = match lookup("LLM_USE_RELAY") {
            Some(raw) => parse_flag(&raw).with_context(|| format!("LLM_USE_RELAY={raw}"))?,
            None => false,
        };

        let language = match lookup("NEUROLENS_LANGUAGE") {
            Some(raw) => raw.parse::<Language>().map_err(anyhow::Error::msg)?,
            None => Language::default(),
        };

        let bind_addr = text("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("BIND_ADDR={bind_addr} is not a socket address"))?;

        Ok(Settings {
            api_key: lookup("LLM_API_KEY").filter(|key| !key.trim().is_empty()),
            api_url: text("LLM_API_URL", DEFAULT_API_URL),
            model: text("LLM_MODEL", DEFAULT_MODEL),
            vision_model: text("LLM_VISION_MODEL", DEFAULT_VISION_MODEL),
            relay_url: text("LLM_RELAY_URL", DEFAULT_RELAY_URL),
            use_relay,
            language,
            bind_addr,
        })
    }

    /// The request's own credential wins; otherwise the configured one.
    pub fn credential<'a>(&'a self, request_key: Option<&'a str>) -> Option<&'a str> {
        request_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .or(self.api_key.as_deref())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            use_relay: false,
            language: Language::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
