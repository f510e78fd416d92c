use avatar_realtime::SessionConfig;
use std::{fmt::Display, str::FromStr, time::Duration};
use tracing::Level;
use url::Url;

/// Backend chat socket used when `AVATAR_WS_URL` is not set.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/chat";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub session: SessionConfig,
    pub log_level: Level,
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let url_str = std::env::var("AVATAR_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
        let url = Url::parse(&url_str)
            .map_err(|e| ConfigError::InvalidValue("AVATAR_WS_URL".to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue(
                "AVATAR_WS_URL".to_string(),
                format!("scheme '{}' is not ws or wss", url.scheme()),
            ));
        }

        let auto_reconnect = parse_var("AVATAR_AUTO_RECONNECT", true)?;
        let reconnect_interval_ms = parse_var("AVATAR_RECONNECT_INTERVAL_MS", 3000u64)?;
        let max_reconnect_attempts = parse_var("AVATAR_MAX_RECONNECT_ATTEMPTS", 5u32)?;
        let heartbeat_interval_ms = parse_var("AVATAR_HEARTBEAT_INTERVAL_MS", 30_000u64)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let session = SessionConfig::new(url)
            .with_auto_reconnect(auto_reconnect)
            .with_reconnect_interval(Duration::from_millis(reconnect_interval_ms))
            .with_max_reconnect_attempts(max_reconnect_attempts)
            .with_heartbeat_interval(Duration::from_millis(heartbeat_interval_ms));

        Ok(Self { session, log_level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("AVATAR_WS_URL");
            env::remove_var("AVATAR_AUTO_RECONNECT");
            env::remove_var("AVATAR_RECONNECT_INTERVAL_MS");
            env::remove_var("AVATAR_MAX_RECONNECT_ATTEMPTS");
            env::remove_var("AVATAR_HEARTBEAT_INTERVAL_MS");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.session.url.as_str(), DEFAULT_WS_URL);
        assert!(config.session.auto_reconnect);
        assert_eq!(config.session.reconnect_interval, Duration::from_millis(3000));
        assert_eq!(config.session.max_reconnect_attempts, 5);
        assert_eq!(config.session.heartbeat_interval, Duration::from_millis(30_000));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("AVATAR_WS_URL", "wss://avatar.example.com/ws/chat");
            env::set_var("AVATAR_AUTO_RECONNECT", "false");
            env::set_var("AVATAR_RECONNECT_INTERVAL_MS", "500");
            env::set_var("AVATAR_MAX_RECONNECT_ATTEMPTS", "2");
            env::set_var("AVATAR_HEARTBEAT_INTERVAL_MS", "10000");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(
            config.session.url.as_str(),
            "wss://avatar.example.com/ws/chat"
        );
        assert!(!config.session.auto_reconnect);
        assert_eq!(config.session.reconnect_interval, Duration::from_millis(500));
        assert_eq!(config.session.max_reconnect_attempts, 2);
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.log_level, Level::DEBUG);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_non_websocket_url() {
        clear_env_vars();
        unsafe {
            env::set_var("AVATAR_WS_URL", "http://localhost:8000/ws/chat");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "AVATAR_WS_URL"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_number() {
        clear_env_vars();
        unsafe {
            env::set_var("AVATAR_MAX_RECONNECT_ATTEMPTS", "many");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, reason) => {
                assert_eq!(var, "AVATAR_MAX_RECONNECT_ATTEMPTS");
                assert!(reason.contains("many"));
            }
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
        }
        clear_env_vars();
    }
}
