use std::time::Duration;
use url::Url;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Query parameter that carries a known session identity on connect.
pub const SESSION_QUERY_PARAM: &str = "session_id";

/// Connection and recovery policy for one [`SessionClient`](crate::SessionClient).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base transport URL, e.g. `ws://localhost:8000/ws/chat`.
    pub url: Url,
    pub auto_reconnect: bool,
    /// Fixed delay before each automatic reconnect attempt.
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Ping period while connected. Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
}

impl SessionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            auto_reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Builds the URL to open, appending the session identity when one is known.
    pub fn target(&self, session_id: Option<&str>) -> Url {
        let mut target = self.url.clone();
        if let Some(id) = session_id {
            target.query_pairs_mut().append_pair(SESSION_QUERY_PARAM, id);
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("ws://localhost:8000/ws/chat").unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new(base());
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(3000));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(30_000));
    }

    #[test]
    fn test_target_without_session() {
        let config = SessionConfig::new(base());
        assert_eq!(config.target(None).as_str(), "ws://localhost:8000/ws/chat");
    }

    #[test]
    fn test_target_encodes_session_id() {
        let config = SessionConfig::new(base());
        assert_eq!(
            config.target(Some("a b&c")).as_str(),
            "ws://localhost:8000/ws/chat?session_id=a+b%26c"
        );
    }

    #[test]
    fn test_target_keeps_existing_query() {
        let config = SessionConfig::new(Url::parse("wss://example.com/ws/chat?lang=en").unwrap());
        let target = config.target(Some("abc"));
        let pairs: Vec<(String, String)> = target
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("lang".to_string(), "en".to_string()),
                ("session_id".to_string(), "abc".to_string())
            ]
        );
    }

    #[test]
    fn test_builder_setters() {
        let config = SessionConfig::new(base())
            .with_auto_reconnect(false)
            .with_reconnect_interval(Duration::from_millis(250))
            .with_max_reconnect_attempts(2)
            .with_heartbeat_interval(Duration::ZERO);
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
        assert_eq!(config.max_reconnect_attempts, 2);
        assert!(config.heartbeat_interval.is_zero());
    }
}
