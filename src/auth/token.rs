use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared holder of the latest access token.
///
/// The HTTP client reads it for every request and the realtime channel reads
/// it on every (re)connect, so a token refreshed elsewhere in the app is picked
/// up without rebuilding either.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))),
        }
    }

    /// Replace the stored token.
    pub async fn set(&self, token: impl Into<String>) {
        let token = token.into();
        *self.token.write().await = (!token.is_empty()).then_some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    pub async fn current(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// `Authorization` header value, if a token is stored.
    pub async fn bearer(&self) -> Option<String> {
        self.current().await.map(|t| format!("Bearer {t}"))
    }

    /// Append the token as a `token` query parameter.
    ///
    /// WebSocket handshakes from browsers can't carry an Authorization header,
    /// so the server accepts the token in the query string instead.
    pub async fn handshake_url(&self, base: &str) -> String {
        match self.current().await {
            Some(token) => {
                let sep = if base.contains('?') { '&' } else { '?' };
                format!("{base}{sep}token={token}")
            }
            None => base.to_string(),
        }
    }
}
