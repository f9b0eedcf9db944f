//! Registry-wide lifecycle operations
//!
//! Bulk restart of every registered connection and cleanup of tunnel
//! adapter services left registered with the OS.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CleanupSettings;
use crate::connection::ConnectionRegistry;
use crate::error::TunnelResult;
use crate::platform::Platform;

pub struct LifecycleOrchestrator {
    registry: ConnectionRegistry,
    platform: Arc<dyn Platform>,
    settings: CleanupSettings,
    /// Serializes restart sequences process-wide
    restart_lock: Mutex<()>,
}

impl LifecycleOrchestrator {
    pub fn new(registry: ConnectionRegistry, platform: Arc<dyn Platform>, settings: CleanupSettings) -> Self {
        Self {
            registry,
            platform,
            settings,
            restart_lock: Mutex::new(()),
        }
    }

    /// Stop every registered connection
    ///
    /// Stop requests are issued to all connections before waiting on any of
    /// them, so teardowns run in parallel. Only one restart runs at a time.
    pub async fn restart_all(&self) -> TunnelResult<()> {
        let _guard = self.restart_lock.lock().await;

        let count = self.stop_all().await;
        info!(count, "Stopped connections for restart");

        // TODO: reconnect the stopped profiles once profile storage is reachable from the service
        Ok(())
    }

    /// Stop and delete tunnel adapter services in every slot
    ///
    /// Slots that were never allocated fail to stop and delete; those
    /// failures are expected and only logged at debug level. No-op on
    /// platforms without adapter services.
    pub async fn platform_cleanup(&self) -> TunnelResult<()> {
        if !self.platform.has_adapter_services() {
            return Ok(());
        }

        let delay = Duration::from_millis(self.settings.service_release_delay_ms);

        for slot in 0..self.settings.adapter_slots {
            let name = self.settings.adapter_service_name(slot);

            if let Err(e) = self.platform.stop_service(&name).await {
                debug!(service = %name, error = %e, "Failed to stop adapter service");
            }
            // Give the service manager time to release the handle
            tokio::time::sleep(delay).await;
            if let Err(e) = self.platform.delete_service(&name).await {
                debug!(service = %name, error = %e, "Failed to delete adapter service");
            }
        }

        info!(
            platform = self.platform.name(),
            slots = self.settings.adapter_slots,
            "Cleaned tunnel adapter services"
        );
        Ok(())
    }

    /// Stop everything and clear residual platform state before exit
    pub async fn shutdown(&self) -> TunnelResult<()> {
        let _guard = self.restart_lock.lock().await;

        let count = self.stop_all().await;
        info!(count, "Stopped connections for shutdown");

        self.platform_cleanup().await?;
        self.registry.clean_state().await;
        Ok(())
    }

    /// JSON status document of every registered connection, ordered by connection id
    pub async fn status_report(&self) -> TunnelResult<Vec<String>> {
        let mut data: Vec<_> = self.registry.get_all_data().await.into_values().collect();
        data.sort_by(|a, b| a.id.cmp(&b.id));
        data.iter().map(|d| d.to_json()).collect()
    }

    async fn stop_all(&self) -> usize {
        let conns = self.registry.get_all().await;

        for conn in conns.values() {
            conn.stop_background();
        }

        for conn in conns.values() {
            conn.stop_wait().await;
        }

        conns.len()
    }
}
