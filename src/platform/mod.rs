//! Platform-specific residual state cleanup
//!
//! Tunnels leave OS-level state behind that outlives the tunnel process:
//! dynamic store keys and DNS overrides on macOS, adapter services on
//! Windows. The [`Platform`] trait is the seam the registry and the lifecycle
//! orchestrator use to clear it. Every operation is best effort; callers log
//! failures and carry on.

pub mod command;
pub mod scutil;
pub mod windows;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::CleanupSettings;
use crate::error::{TunnelError, TunnelResult};

pub use scutil::ScutilPlatform;
pub use windows::ServicePlatform;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Backend name for log events
    fn name(&self) -> &'static str;

    /// Remove leftover per-connection entries from the host network
    /// configuration store
    async fn clear_network_store(&self) -> TunnelResult<()>;

    /// Revert a DNS override applied while tunnels were up
    async fn revert_dns(&self) -> TunnelResult<()>;

    /// Whether tunnel adapters are hosted as named OS services
    fn has_adapter_services(&self) -> bool {
        false
    }

    async fn stop_service(&self, name: &str) -> TunnelResult<()> {
        Err(TunnelError::NotSupported(format!("stop service {}", name)))
    }

    async fn delete_service(&self, name: &str) -> TunnelResult<()> {
        Err(TunnelError::NotSupported(format!("delete service {}", name)))
    }
}

/// Platform without residual tunnel state
pub struct NoopPlatform;

#[async_trait]
impl Platform for NoopPlatform {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn clear_network_store(&self) -> TunnelResult<()> {
        Ok(())
    }

    async fn revert_dns(&self) -> TunnelResult<()> {
        Ok(())
    }
}

/// Select the backend for the platform this binary was built for
pub fn system(settings: &CleanupSettings) -> Arc<dyn Platform> {
    if cfg!(target_os = "macos") {
        return Arc::new(ScutilPlatform::new(settings));
    }
    if cfg!(target_os = "windows") {
        return Arc::new(ServicePlatform::new());
    }
    Arc::new(NoopPlatform)
}
