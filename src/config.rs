use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api/v1";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:3000/ws";

/// Timing knobs owned by a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle time after the last keystroke before stop-typing is emitted.
    pub typing_idle: Duration,
    /// Quiet period after the view changes before smart replies are requested.
    pub smart_reply_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_idle: Duration::from_millis(2000),
            smart_reply_debounce: Duration::from_millis(800),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_url: String,
    /// WebSocket endpoint of the realtime channel.
    pub socket_url: String,
    /// Delay between reconnect attempts of the realtime channel.
    pub reconnect_delay: Duration,
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            reconnect_delay: Duration::from_millis(1000),
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("CHAT_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            socket_url: std::env::var("CHAT_SOCKET_URL").unwrap_or(defaults.socket_url),
            reconnect_delay: parse_duration_millis("CHAT_RECONNECT_DELAY_MS", 1000),
            session: SessionConfig {
                typing_idle: parse_duration_millis("CHAT_TYPING_IDLE_MS", 2000),
                smart_reply_debounce: parse_duration_millis("CHAT_SMART_REPLY_DEBOUNCE_MS", 800),
            },
        }
    }
}

fn parse_duration_millis(env_var: &str, default: u64) -> Duration {
    std::env::var(env_var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default))
}
