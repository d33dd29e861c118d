//! Client configuration.

use std::fmt;

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://websocket.hookman.ng";

/// Settings for one client instance.
///
/// `Debug` never prints the API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Key sent in the auth command when the connection opens.
    pub api_key: String,

    /// WebSocket URL of the service.
    ///
    /// Default: [`DEFAULT_ENDPOINT`].
    pub endpoint: String,
}

impl ClientConfig {
    /// Creates a config for `api_key` using the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_endpoint() {
        let config = ClientConfig::new("key");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let printed = format!("{:?}", ClientConfig::new("super-secret"));
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains(DEFAULT_ENDPOINT));
    }
}
