//! macOS dynamic store cleanup via scutil
//!
//! Tunnels publish per-connection keys and a DNS override in the
//! SystemConfiguration dynamic store. Both have to be removed once no tunnel
//! is left, otherwise the host keeps resolving through a dead tunnel.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{command, Platform};
use crate::config::CleanupSettings;
use crate::error::TunnelResult;

pub struct ScutilPlatform {
    connection_prefix: String,
    dns_key: String,
}

impl ScutilPlatform {
    pub fn new(settings: &CleanupSettings) -> Self {
        Self {
            connection_prefix: settings.scutil_connection_prefix.trim_end_matches('/').to_string(),
            dns_key: settings.scutil_dns_key.clone(),
        }
    }

    async fn scutil(&self, script: &str) -> TunnelResult<String> {
        command::run_with_input("scutil", &[], Some(script)).await
    }

    async fn connection_keys(&self) -> TunnelResult<Vec<String>> {
        let output = self
            .scutil(&format!("list {}/.*\nquit\n", self.connection_prefix))
            .await?;
        Ok(parse_key_list(&output))
    }
}

/// Extract key names from `scutil` `list` output:
///
/// ```text
///   subKey [0] = State:/Network/Tunnelctl/Connection/abc
/// ```
pub fn parse_key_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("subKey"))
        .filter_map(|line| line.split_once(" = "))
        .map(|(_, key)| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

#[async_trait]
impl Platform for ScutilPlatform {
    fn name(&self) -> &'static str {
        "scutil"
    }

    async fn clear_network_store(&self) -> TunnelResult<()> {
        let keys = self.connection_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut script = String::new();
        for key in &keys {
            debug!(key = %key, "Removing scutil connection key");
            script.push_str(&format!("remove {}\n", key));
        }
        script.push_str("quit\n");
        self.scutil(&script).await?;

        info!(count = keys.len(), "Cleared scutil connection keys");
        Ok(())
    }

    async fn revert_dns(&self) -> TunnelResult<()> {
        self.scutil(&format!("remove {}\nquit\n", self.dns_key)).await?;

        // Cache flush failures leave stale entries that expire on their own
        if let Err(e) = command::run("dscacheutil", &["-flushcache"]).await {
            warn!(error = %e, "Failed to flush DNS cache");
        }
        if let Err(e) = command::run("killall", &["-HUP", "mDNSResponder"]).await {
            warn!(error = %e, "Failed to signal mDNSResponder");
        }

        info!(key = %self.dns_key, "Reverted DNS override");
        Ok(())
    }
}
