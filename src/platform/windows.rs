//! Windows tunnel adapter services
//!
//! WireGuard tunnels on Windows run as named services
//! (`WireGuardTunnel$<name>`). A crashed client leaves them registered and
//! holding the adapter.

use async_trait::async_trait;

use super::{command, Platform};
use crate::error::TunnelResult;

pub struct ServicePlatform;

impl ServicePlatform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ServicePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for ServicePlatform {
    fn name(&self) -> &'static str {
        "windows-service"
    }

    async fn clear_network_store(&self) -> TunnelResult<()> {
        Ok(())
    }

    async fn revert_dns(&self) -> TunnelResult<()> {
        Ok(())
    }

    fn has_adapter_services(&self) -> bool {
        true
    }

    async fn stop_service(&self, name: &str) -> TunnelResult<()> {
        command::run("sc.exe", &["stop", name]).await.map(|_| ())
    }

    async fn delete_service(&self, name: &str) -> TunnelResult<()> {
        command::run("sc.exe", &["delete", name]).await.map(|_| ())
    }
}
