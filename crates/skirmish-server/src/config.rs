use serde::Deserialize;

/// Top-level server configuration, loaded from `skirmish.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9910".to_string(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Infrastructure limits (dispatcher sizing, room caps).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Dispatcher worker tasks. 0 sizes the pool to `2 * cpus + 2`.
    pub workers: usize,
    /// Largest member count a room may be created with.
    pub max_room_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_room_limit: 16,
        }
    }
}

impl ServerConfig {
    /// Validate configuration, logging warnings for issues.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }

        if self.limits.max_room_limit == 0 {
            tracing::error!("limits.max_room_limit must be > 0");
            std::process::exit(1);
        }
        // Team positions are dense within an 8-wide band per team.
        if self.limits.max_room_limit > 16 {
            tracing::error!("limits.max_room_limit must be <= 16");
            std::process::exit(1);
        }
    }

    /// Load config from `skirmish.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("skirmish.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from skirmish.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse skirmish.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No skirmish.toml found, using defaults");
                ServerConfig::default()
            },
        };

        // Environment variable overrides
        if let Ok(addr) = std::env::var("SKIRMISH_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("SKIRMISH_WORKERS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.workers = n;
        }
        if let Ok(val) = std::env::var("SKIRMISH_MAX_ROOM_LIMIT")
            && let Ok(n) = val.parse::<u32>()
        {
            config.limits.max_room_limit = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:9910");
        assert_eq!(config.limits.workers, 0);
        assert_eq!(config.limits.max_room_limit, 16);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:4000"

            [limits]
            workers = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.limits.workers, 4);
        assert_eq!(config.limits.max_room_limit, 16);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, ServerConfig::default().listen_addr);
    }
}
