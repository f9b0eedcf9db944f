//! Configuration management for tunnelctl

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::error::{TunnelError, TunnelResult};

/// Main tunnelctl configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelctlConfig {
    /// Logging defaults, overridden by `RUST_LOG`
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Residual platform state cleanup
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Adapter service name; `{slot}` is replaced by the slot index
    #[serde(default = "default_adapter_service_template")]
    pub adapter_service_template: String,
    /// Number of adapter slots visited during cleanup
    #[serde(default = "default_adapter_slots")]
    pub adapter_slots: u32,
    /// Delay between stopping and deleting a service (milliseconds)
    #[serde(default = "default_service_release_delay_ms")]
    pub service_release_delay_ms: u64,
    /// Dynamic store prefix of per-connection keys (macOS)
    #[serde(default = "default_scutil_connection_prefix")]
    pub scutil_connection_prefix: String,
    /// Dynamic store key holding the DNS override (macOS)
    #[serde(default = "default_scutil_dns_key")]
    pub scutil_dns_key: String,
    /// Bound on each residual state cleanup call (milliseconds)
    #[serde(default = "default_platform_timeout_ms")]
    pub platform_timeout_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_adapter_service_template() -> String {
    "WireGuardTunnel$tunnelctl{slot}".to_string()
}

fn default_adapter_slots() -> u32 {
    10
}

fn default_service_release_delay_ms() -> u64 {
    100
}

fn default_scutil_connection_prefix() -> String {
    "State:/Network/Tunnelctl/Connection".to_string()
}

fn default_scutil_dns_key() -> String {
    "State:/Network/Service/Tunnelctl/DNS".to_string()
}

fn default_platform_timeout_ms() -> u64 {
    10_000
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            adapter_service_template: default_adapter_service_template(),
            adapter_slots: default_adapter_slots(),
            service_release_delay_ms: default_service_release_delay_ms(),
            scutil_connection_prefix: default_scutil_connection_prefix(),
            scutil_dns_key: default_scutil_dns_key(),
            platform_timeout_ms: default_platform_timeout_ms(),
        }
    }
}

impl CleanupSettings {
    /// Service name for an adapter slot
    pub fn adapter_service_name(&self, slot: u32) -> String {
        self.adapter_service_template.replace("{slot}", &slot.to_string())
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_timeout_ms)
    }
}

impl TunnelctlConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> TunnelResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TunnelError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> TunnelResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> TunnelResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TunnelError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TunnelResult<()> {
        std::fs::write(path.as_ref(), self.to_toml()?)
            .map_err(|e| TunnelError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> TunnelResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TunnelError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    fn validate(&self) -> TunnelResult<()> {
        if !self.cleanup.adapter_service_template.contains("{slot}") {
            return Err(TunnelError::ConfigError(
                "adapter_service_template must contain {slot}".to_string()
            ));
        }
        if self.cleanup.platform_timeout_ms == 0 {
            return Err(TunnelError::ConfigError(
                "platform_timeout_ms must be greater than zero".to_string()
            ));
        }
        Ok(())
    }
}
