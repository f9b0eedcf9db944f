//! Registry of live tunnel connections keyed by profile id
//!
//! Request handlers register a connection when a tunnel starts and
//! unregister it when the tunnel is gone. Each profile has at most one
//! authoritative connection. Registering over a live entry and removing an
//! entry with a foreign handle are caller bugs; both are logged and resolved
//! without failing the caller.
//!
//! Whenever the registry is observed empty, a clean-state pass removes
//! residual platform state (dynamic store keys, DNS overrides) left by the
//! tunnels. The pass runs opportunistically from reads and after removals,
//! never on a timer.
//!
//! # Locking
//!
//! All state sits behind one `RwLock`. Mutations (register, unregister, the
//! DNS flag, committing a clean pass) take the write lock. Reads take the
//! read lock. Platform cleanup itself runs with no registry lock held, each
//! call bounded by a timeout, so a hung platform command cannot stall
//! callers. Passes are serialized by a separate mutex; a pass that finds
//! another one running skips. A pass only marks the registry clean if no
//! registration happened while it ran.

use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{same_connection, ConnectionData, ConnectionHandle, ConnectionStatus};
use crate::error::{TunnelError, TunnelResult};
use crate::platform::Platform;

/// Default bound on each platform cleanup call
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

struct RegistryState {
    conns: HashMap<String, ConnectionHandle>,
    /// A DNS override has been applied since the last successful cleanup
    dns_forced: bool,
    /// Platform cleanup is owed for the next empty observation
    needs_clean: bool,
    /// Bumped on every registration and DNS override
    generation: u64,
}

struct Inner {
    state: RwLock<RegistryState>,
    /// Serializes clean-state passes
    clean_lock: Mutex<()>,
    platform: Arc<dyn Platform>,
    cleanup_timeout: Duration,
}

/// Process-wide table of active connections
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    ///
    /// The first clean-state pass always runs platform cleanup so residue
    /// from a previous process is cleared.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self::with_cleanup_timeout(platform, DEFAULT_CLEANUP_TIMEOUT)
    }

    /// Create an empty registry bounding each platform cleanup call by `timeout`
    pub fn with_cleanup_timeout(platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(RegistryState {
                    conns: HashMap::new(),
                    dns_forced: false,
                    needs_clean: true,
                    generation: 0,
                }),
                clean_lock: Mutex::new(()),
                platform,
                cleanup_timeout: timeout,
            }),
        }
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.inner.state.read().await.conns.len()
    }

    /// True if at least one connection is registered
    pub async fn has_active(&self) -> bool {
        !self.inner.state.read().await.conns.is_empty()
    }

    /// True if any registered connection is connected
    pub async fn has_connected(&self) -> bool {
        self.inner
            .state
            .read()
            .await
            .conns
            .values()
            .any(|conn| conn.status() == ConnectionStatus::Connected)
    }

    /// Register `conn` as the connection for `profile_id`
    ///
    /// If the profile already has a connection, that connection is stopped
    /// and waited on before being replaced. This blocks for as long as the
    /// stale connection takes to stop, with no timeout. Do not call it while
    /// holding a lock other tasks need.
    pub async fn register(&self, profile_id: &str, conn: ConnectionHandle) {
        let stale = {
            let mut state = self.inner.state.write().await;
            state.needs_clean = true;
            state.generation += 1;
            match state.conns.get(profile_id).cloned() {
                Some(existing) => existing,
                None => {
                    state.conns.insert(profile_id.to_string(), conn);
                    debug!(profile_id = %profile_id, "Registered connection");
                    return;
                }
            }
        };

        error!(
            profile_id = %profile_id,
            connection = %stale.fields(),
            "Overwriting stored connection"
        );
        stale.stop_wait().await;

        {
            let mut state = self.inner.state.write().await;
            if let Some(current) = state.conns.get(profile_id) {
                current.force_stopping();
            }
            state.conns.insert(profile_id.to_string(), conn.clone());
            state.needs_clean = true;
            state.generation += 1;
        }

        error!(
            profile_id = %profile_id,
            connection = %conn.fields(),
            "Overwrote stored connection"
        );
    }

    /// Remove `conn` from `profile_id` if it is the stored connection
    ///
    /// The entry is only removed when the stored handle is the same object as
    /// `conn`. A clean-state pass is spawned afterwards in the background.
    pub async fn unregister(&self, profile_id: &str, conn: &ConnectionHandle) {
        {
            let mut state = self.inner.state.write().await;
            let current = state.conns.get(profile_id).cloned();
            match current {
                Some(current) if same_connection(&current, conn) => {
                    state.conns.remove(profile_id);
                    debug!(profile_id = %profile_id, "Unregistered connection");
                }
                current => {
                    let stored = current
                        .map(|c| c.fields().to_string())
                        .unwrap_or_else(|| "none".to_string());
                    error!(
                        profile_id = %profile_id,
                        connection = %stored,
                        "Attempting to delete active connection"
                    );
                    error!(
                        profile_id = %profile_id,
                        connection = %conn.fields(),
                        "Attempted to delete active connection"
                    );
                }
            }
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.clean_state(false).await;
        });
    }

    /// Connection registered for `profile_id`
    pub async fn get(&self, profile_id: &str) -> Option<ConnectionHandle> {
        self.inner.clean_state(false).await;
        self.inner.state.read().await.conns.get(profile_id).cloned()
    }

    /// Status snapshot of the connection registered for `profile_id`
    pub async fn get_data(&self, profile_id: &str) -> Option<ConnectionData> {
        self.inner.clean_state(false).await;
        self.inner
            .state
            .read()
            .await
            .conns
            .get(profile_id)
            .map(|conn| conn.data())
    }

    /// All registered connections keyed by connection id
    pub async fn get_all(&self) -> HashMap<String, ConnectionHandle> {
        self.inner.clean_state(false).await;
        self.inner
            .state
            .read()
            .await
            .conns
            .values()
            .map(|conn| (conn.id().to_string(), conn.clone()))
            .collect()
    }

    /// Status snapshots of all registered connections keyed by connection id
    pub async fn get_all_data(&self) -> HashMap<String, ConnectionData> {
        self.inner.clean_state(false).await;
        self.inner
            .state
            .read()
            .await
            .conns
            .values()
            .map(|conn| (conn.id().to_string(), conn.data()))
            .collect()
    }

    /// Ids of all registered connections
    pub async fn get_all_ids(&self) -> HashSet<String> {
        self.inner.clean_state(false).await;
        self.inner
            .state
            .read()
            .await
            .conns
            .values()
            .map(|conn| conn.id().to_string())
            .collect()
    }

    /// Record that a DNS override is applied on the host
    pub async fn mark_dns_forced(&self) {
        let mut state = self.inner.state.write().await;
        state.dns_forced = true;
        state.needs_clean = true;
        state.generation += 1;
    }

    pub async fn is_dns_forced(&self) -> bool {
        self.inner.state.read().await.dns_forced
    }

    /// Run a clean-state pass now
    ///
    /// Does nothing unless the registry is empty and cleanup is owed. Waits
    /// for a pass already in flight before checking.
    pub async fn clean_state(&self) {
        self.inner.clean_state(true).await;
    }
}

impl Inner {
    /// Run a clean-state pass, containing any panic raised by the platform
    ///
    /// Rust unwinds before the panic reaches this point, so the logged
    /// `recovered_at` backtrace shows where the panic was caught, not where
    /// it was raised. The panic message identifies the origin.
    ///
    /// With `wait` unset, a pass already in flight makes this one a no-op.
    async fn clean_state(&self, wait: bool) {
        let result = AssertUnwindSafe(self.clean_state_unguarded(wait)).catch_unwind().await;
        if let Err(panic) = result {
            error!(
                panic = %panic_message(panic.as_ref()),
                recovered_at = %Backtrace::force_capture(),
                "Clean state panic"
            );
        }
    }

    async fn clean_state_unguarded(&self, wait: bool) {
        let _pass = if wait {
            self.clean_lock.lock().await
        } else {
            // Another pass is already running and will settle the state
            match self.clean_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => return,
            }
        };

        let (generation, dns_forced) = {
            let state = self.state.read().await;
            if !state.needs_clean || !state.conns.is_empty() {
                return;
            }
            (state.generation, state.dns_forced)
        };

        let mut clean = true;

        let store = self.bounded(self.platform.clear_network_store(), "clear network store").await;
        if let Err(e) = store {
            error!(
                platform = self.platform.name(),
                error = %e,
                "Failed to clear network configuration store keys"
            );
            clean = false;
        }

        let mut dns_reverted = false;
        if dns_forced {
            match self.bounded(self.platform.revert_dns(), "revert DNS").await {
                Ok(()) => dns_reverted = true,
                Err(e) => {
                    error!(
                        platform = self.platform.name(),
                        error = %e,
                        "Failed to revert DNS override"
                    );
                    clean = false;
                }
            }
        }

        let mut state = self.state.write().await;
        if state.generation != generation || !state.conns.is_empty() {
            // A tunnel was registered while cleanup ran; a later pass is owed
            warn!(platform = self.platform.name(), "Registry changed during clean state pass");
            return;
        }
        if dns_reverted {
            state.dns_forced = false;
        }
        if clean {
            state.needs_clean = false;
            info!(platform = self.platform.name(), "Cleaned residual tunnel state");
        }
    }

    async fn bounded<F>(&self, call: F, what: &str) -> TunnelResult<()>
    where
        F: Future<Output = TunnelResult<()>>,
    {
        match tokio::time::timeout(self.cleanup_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TunnelError::Timeout(format!(
                "{} did not finish within {:?}",
                what, self.cleanup_timeout
            ))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
