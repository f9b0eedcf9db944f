//! Tunnel connection surface and registry
//!
//! A [`Connection`] is a live tunnel session created by a protocol engine
//! (OpenVPN, WireGuard). The engine owns its negotiation state machine; this
//! crate only needs to identify it, read its status, and stop it.
//!
//! The [`ConnectionRegistry`] tracks which connection is authoritative for
//! each profile id.

pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::TunnelResult;

pub use registry::ConnectionRegistry;

/// Shared reference to a live connection
pub type ConnectionHandle = Arc<dyn Connection>;

/// Tunnel session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Disconnecting => "disconnecting",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status snapshot of a connection, as reported to front ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionData {
    /// Connection id (distinct from the profile id)
    pub id: String,
    /// Profile this connection was started from
    pub profile_id: String,
    /// Protocol mode (e.g. "ovpn", "wg")
    pub mode: String,
    pub status: ConnectionStatus,
    /// Time the tunnel came up
    pub timestamp: Option<DateTime<Utc>>,
    /// Normalized remote endpoint
    pub server_address: Option<String>,
    /// Tunnel-side client address
    pub client_address: Option<String>,
}

impl ConnectionData {
    pub fn new(id: impl Into<String>, profile_id: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profile_id: profile_id.into(),
            mode: mode.into(),
            status: ConnectionStatus::Connecting,
            timestamp: None,
            server_address: None,
            client_address: None,
        }
    }

    /// JSON status document for front ends
    pub fn to_json(&self) -> TunnelResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Ordered key/value set attached to log events about a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFields(BTreeMap<String, String>);

impl ConnectionFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn from_data(data: &ConnectionData) -> Self {
        let mut fields = Self::new()
            .with("connection_id", &data.id)
            .with("profile_id", &data.profile_id)
            .with("mode", &data.mode)
            .with("status", data.status);
        if let Some(ts) = &data.timestamp {
            fields.insert("timestamp", ts.to_rfc3339());
        }
        if let Some(addr) = &data.server_address {
            fields.insert("server_address", addr);
        }
        if let Some(addr) = &data.client_address {
            fields.insert("client_address", addr);
        }
        fields
    }
}

impl fmt::Display for ConnectionFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Capability surface the registry and orchestrator need from a tunnel session
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection id, distinct from the profile id
    fn id(&self) -> &str;

    /// Profile this connection belongs to
    fn profile_id(&self) -> &str;

    /// Current status
    fn status(&self) -> ConnectionStatus;

    /// Status snapshot
    fn data(&self) -> ConnectionData;

    /// Request an asynchronous stop and return immediately
    fn stop_background(&self);

    /// Stop the connection and wait until teardown has completed
    async fn stop_wait(&self);

    /// Move the session state to stopping without waiting for teardown
    fn force_stopping(&self);

    /// Diagnostic fields for log events
    fn fields(&self) -> ConnectionFields {
        ConnectionFields::from_data(&self.data())
    }
}

/// True when both handles refer to the same connection object.
///
/// Compares data pointers only: two `Arc<dyn Connection>` built from the same
/// allocation may carry different vtable pointers.
pub fn same_connection(a: &ConnectionHandle, b: &ConnectionHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}


#[cfg(test)]
mod tests {
    use super::testing::FakeConnection;
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&ConnectionStatus::Connected).unwrap(), "\"connected\"");
        assert_eq!(ConnectionStatus::Disconnecting.to_string(), "disconnecting");
    }

    #[test]
    fn test_data_json() {
        let mut data = ConnectionData::new("c1", "p1", "wg");
        data.status = ConnectionStatus::Connected;
        let value: serde_json::Value = serde_json::from_str(&data.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], "c1");
        assert_eq!(value["profile_id"], "p1");
        assert_eq!(value["status"], "connected");
        assert!(value["timestamp"].is_null());
    }

    #[test]
    fn test_fields_from_data() {
        let mut data = ConnectionData::new("c1", "p1", "ovpn");
        data.status = ConnectionStatus::Connected;
        data.server_address = Some("192.0.2.10:1194".to_string());

        let fields = ConnectionFields::from_data(&data);
        assert_eq!(fields.get("connection_id"), Some("c1"));
        assert_eq!(fields.get("status"), Some("connected"));
        assert_eq!(fields.get("client_address"), None);
        assert_eq!(
            fields.to_string(),
            "connection_id=c1 mode=ovpn profile_id=p1 server_address=192.0.2.10:1194 status=connected"
        );
    }

    #[test]
    fn test_same_connection_is_identity() {
        let a: ConnectionHandle = FakeConnection::new("c1", "p1", ConnectionStatus::Connected);
        let b: ConnectionHandle = FakeConnection::new("c1", "p1", ConnectionStatus::Connected);
        let a2 = a.clone();

        assert!(same_connection(&a, &a2));
        assert!(!same_connection(&a, &b));
    }
}
