//! Service context handed to request handlers
//!
//! Built once at daemon start and shared by reference for the lifetime of
//! the process.

use std::sync::Arc;

use crate::config::TunnelctlConfig;
use crate::connection::ConnectionRegistry;
use crate::lifecycle::LifecycleOrchestrator;
use crate::platform::{self, Platform};

pub struct ServiceContext {
    config: TunnelctlConfig,
    registry: ConnectionRegistry,
    orchestrator: Arc<LifecycleOrchestrator>,
}

impl ServiceContext {
    /// Create a context backed by the platform this binary was built for
    pub fn new(config: TunnelctlConfig) -> Self {
        let platform = platform::system(&config.cleanup);
        Self::with_platform(config, platform)
    }

    pub fn with_platform(config: TunnelctlConfig, platform: Arc<dyn Platform>) -> Self {
        let registry =
            ConnectionRegistry::with_cleanup_timeout(platform.clone(), config.cleanup.platform_timeout());
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            registry.clone(),
            platform,
            config.cleanup.clone(),
        ));

        Self {
            config,
            registry,
            orchestrator,
        }
    }

    pub fn config(&self) -> &TunnelctlConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> Arc<LifecycleOrchestrator> {
        self.orchestrator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::FakeConnection;
    use crate::connection::ConnectionStatus;
    use crate::platform::NoopPlatform;

    #[tokio::test]
    async fn test_context_shares_registry() {
        let ctx = ServiceContext::with_platform(TunnelctlConfig::default(), Arc::new(NoopPlatform));
        let conn = FakeConnection::new("c1", "p1", ConnectionStatus::Connected);
        ctx.registry().register("p1", conn.clone()).await;

        ctx.orchestrator().restart_all().await.unwrap();
        assert_eq!(conn.stop_waits(), 1);
        assert_eq!(ctx.config().cleanup.adapter_slots, 10);
    }
}
