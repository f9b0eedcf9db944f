//! tunnelctl - VPN client service core
//!
//! Background service library providing:
//! - Registry of live tunnel connections keyed by profile id
//! - Lifecycle orchestration (bulk restart, adapter cleanup, shutdown)
//! - Residual platform state cleanup (macOS dynamic store and DNS,
//!   Windows tunnel adapter services)
//! - Endpoint address sanitization and normalization
//!
//! Tunnel protocol engines plug in through the [`Connection`] trait.

pub mod error;
pub mod config;
pub mod address;
pub mod connection;
pub mod platform;
pub mod lifecycle;
pub mod service;

// Re-export commonly used types
pub use error::{TunnelError, TunnelResult};
pub use config::{CleanupSettings, LoggingSettings, TunnelctlConfig};
pub use address::{filter_host, normalize_address, DEFAULT_TLS_PORT, MAX_HOST_LEN};
pub use connection::{
    same_connection, Connection, ConnectionData, ConnectionFields, ConnectionHandle,
    ConnectionRegistry, ConnectionStatus,
};
pub use platform::{NoopPlatform, Platform, ScutilPlatform, ServicePlatform};
pub use lifecycle::LifecycleOrchestrator;
pub use service::ServiceContext;
