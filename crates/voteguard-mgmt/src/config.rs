use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use voteguard_core::GuardConfig;

/// Daemon settings. Engine policy lives under `[guard]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MgmtConfig {
    /// Admin API listen address.
    pub bind_addr: SocketAddr,
    /// Bearer token for the admin API. `None` leaves the API open.
    pub admin_token: Option<String>,
    /// Seconds between retention sweeps.
    pub sweep_interval_secs: u64,
    /// Failed auth attempts per minute before a client is locked out.
    pub auth_max_failures: u32,
    /// Lockout length in seconds.
    pub auth_lockout_secs: u64,
    /// Engine policy.
    pub guard: GuardConfig,
}

impl Default for MgmtConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            admin_token: None,
            sweep_interval_secs: 60,
            auth_max_failures: 5,
            auth_lockout_secs: 60,
            guard: GuardConfig::default(),
        }
    }
}

impl MgmtConfig {
    /// Load from a `.toml` or `.json` file and validate the engine policy.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: MgmtConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.guard.validate()?;
        if config.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use voteguard_core::FlagExpiry;

    #[test]
    fn test_default_values() {
        let config = MgmtConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8443)));
        assert!(config.admin_token.is_none());
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.auth_max_failures, 5);
        assert_eq!(config.guard, GuardConfig::default());
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{
                "bind_addr": "127.0.0.1:9000",
                "admin_token": "s3cret",
                "guard": {{ "burst_threshold": 4, "user_hourly_cap": 30 }}
            }}"#
        )
        .unwrap();

        let config = MgmtConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.guard.burst_threshold, 4);
        assert_eq!(config.guard.user_hourly_cap, 30);
        assert_eq!(config.guard.address_hourly_cap, 20);
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
bind_addr = "10.0.0.1:8080"
sweep_interval_secs = 30

[guard]
retention_secs = 7200
release_flag_on_dismiss = true

[guard.flag_expiry]
policy = "after_secs"
secs = 86400
            "#
        )
        .unwrap();

        let config = MgmtConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([10, 0, 0, 1], 8080)));
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.guard.retention_secs, 7200);
        assert!(config.guard.release_flag_on_dismiss);
        assert_eq!(
            config.guard.flag_expiry,
            FlagExpiry::AfterSecs { secs: 86_400 }
        );
    }

    #[test]
    fn test_from_file_rejects_invalid_policy() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[guard]\nretention_secs = 10").unwrap();
        assert!(MgmtConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        let err = MgmtConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported config file extension"));
    }
}
