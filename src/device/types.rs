//! Device and traversal data types
//!
//! These types describe the work items flowing through the frontier and
//! the facts collected from each device. Fields the parser cannot fill
//! are empty strings, never missing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default SSH port for device sessions
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Device type assigned to discovered neighbors by default
pub const DEFAULT_DEVICE_TYPE: &str = "cisco_ios";

/// Login credentials shared by every visit derived from the seed
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login user
    pub username: String,

    /// Login password
    pub password: String,

    /// SSH port
    pub port: u16,
}

impl Credentials {
    /// Create credentials for the default SSH port
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            port: DEFAULT_SSH_PORT,
        }
    }

    /// Override the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .field("port", &self.port)
            .finish()
    }
}

/// A device waiting to be visited
#[derive(Debug, Clone)]
pub struct PendingVisit {
    /// Address to connect to (as reported, not normalized)
    pub address: String,

    /// Credentials inherited from the seed
    pub credentials: Arc<Credentials>,

    /// Device type used to pick the session flavor
    pub device_type_hint: String,

    /// Address of the device that reported this one (None for the seed)
    pub source_address: Option<String>,

    /// Hops from the seed (0 = seed)
    pub depth: u32,
}

impl PendingVisit {
    /// Create the seed visit
    pub fn seed(
        address: impl Into<String>,
        credentials: Credentials,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            credentials: Arc::new(credentials),
            device_type_hint: device_type.into(),
            source_address: None,
            depth: 0,
        }
    }

    /// Derive a visit for a neighbor reported by this device
    pub fn neighbor(&self, address: impl Into<String>, device_type_hint: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: Arc::clone(&self.credentials),
            device_type_hint: device_type_hint.into(),
            source_address: Some(self.address.clone()),
            depth: self.depth + 1,
        }
    }

    /// Check if this is the seed visit
    pub fn is_seed(&self) -> bool {
        self.source_address.is_none()
    }
}

/// One adjacency reported by a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborRef {
    /// CDP device ID (usually the neighbor's hostname)
    pub device_id: String,

    /// Management or entry address
    pub address: String,

    /// Hardware platform
    pub platform: String,

    /// Interface on the reporting device
    pub local_interface: String,

    /// Interface on the neighbor
    pub neighbor_interface: String,

    /// Advertised capabilities (Router, Switch, ...)
    pub capabilities: String,
}

/// Identity facts parsed from `show version`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub hostname: String,
    pub version: String,
    pub platform: String,
    pub serial_number: String,
    pub uptime: String,
    pub config_register: String,
    pub mac_address: String,
}

impl DeviceIdentity {
    /// Check if none of the persisted fields were found
    pub fn is_empty(&self) -> bool {
        self.hostname.is_empty()
            && self.version.is_empty()
            && self.platform.is_empty()
            && self.serial_number.is_empty()
    }
}

/// The result of a successful device visit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub address: String,
    pub hostname: String,
    pub device_type: String,
    pub serial_number: String,
    pub platform: String,
    pub version: String,
    pub neighbors: Vec<NeighborRef>,
}

impl DeviceRecord {
    /// Build a record from parsed identity and neighbor facts
    pub fn from_identity(
        address: impl Into<String>,
        device_type: impl Into<String>,
        identity: DeviceIdentity,
        neighbors: Vec<NeighborRef>,
    ) -> Self {
        Self {
            address: address.into(),
            hostname: identity.hostname,
            device_type: device_type.into(),
            serial_number: identity.serial_number,
            platform: identity.platform,
            version: identity.version,
            neighbors,
        }
    }

    /// Serialize the neighbor list for storage
    pub fn neighbors_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.neighbors)
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device(hostname={}, address={}, type={})",
            self.hostname, self.address, self.device_type
        )
    }
}

/// How discovered neighbors get their device type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTypePolicy {
    /// Every neighbor gets the same type
    Fixed(String),

    /// Guess from the CDP platform string, falling back to a fixed type
    InferFromPlatform { fallback: String },
}

impl Default for DeviceTypePolicy {
    fn default() -> Self {
        DeviceTypePolicy::Fixed(DEFAULT_DEVICE_TYPE.to_string())
    }
}

impl DeviceTypePolicy {
    /// Device type to use when visiting `neighbor`
    pub fn hint_for(&self, neighbor: &NeighborRef) -> String {
        match self {
            DeviceTypePolicy::Fixed(device_type) => device_type.clone(),
            DeviceTypePolicy::InferFromPlatform { fallback } => {
                infer_device_type(&neighbor.platform)
                    .map(str::to_string)
                    .unwrap_or_else(|| fallback.clone())
            }
        }
    }
}

fn infer_device_type(platform: &str) -> Option<&'static str> {
    let platform = platform.to_ascii_uppercase();

    if platform.contains("NEXUS") || platform.starts_with("N9K") || platform.starts_with("N7K")
        || platform.starts_with("N5K") || platform.starts_with("N3K")
    {
        Some("cisco_nxos")
    } else if platform.contains("ASA") {
        Some("cisco_asa")
    } else if platform.contains("ASR9K") || platform.contains("IOS-XR") || platform.contains("XRV") {
        Some("cisco_xr")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
        assert_eq!(creds.port, DEFAULT_SSH_PORT);
    }

    #[test]
    fn test_neighbor_visit_inherits_credentials() {
        let seed = PendingVisit::seed("10.0.0.1", Credentials::new("a", "b").with_port(2222), "cisco_ios");
        assert!(seed.is_seed());

        let next = seed.neighbor("10.0.0.2", "cisco_nxos");
        assert!(!next.is_seed());
        assert_eq!(next.depth, 1);
        assert_eq!(next.source_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(next.credentials.port, 2222);
        assert!(Arc::ptr_eq(&seed.credentials, &next.credentials));
    }

    #[test]
    fn test_record_from_identity_keeps_empty_fields() {
        let identity = DeviceIdentity {
            hostname: "core-1".into(),
            ..Default::default()
        };
        let record = DeviceRecord::from_identity("10.0.0.1", "cisco_ios", identity, Vec::new());

        assert_eq!(record.hostname, "core-1");
        assert_eq!(record.serial_number, "");
        assert_eq!(record.neighbors_json().unwrap(), "[]");
        assert_eq!(
            record.to_string(),
            "Device(hostname=core-1, address=10.0.0.1, type=cisco_ios)"
        );
    }

    #[test]
    fn test_device_type_policy() {
        let nexus = NeighborRef {
            platform: "N9K-C9300v".into(),
            ..Default::default()
        };
        let catalyst = NeighborRef {
            platform: "cisco WS-C3750X-48P".into(),
            ..Default::default()
        };

        let fixed = DeviceTypePolicy::default();
        assert_eq!(fixed.hint_for(&nexus), DEFAULT_DEVICE_TYPE);

        let infer = DeviceTypePolicy::InferFromPlatform {
            fallback: DEFAULT_DEVICE_TYPE.into(),
        };
        assert_eq!(infer.hint_for(&nexus), "cisco_nxos");
        assert_eq!(infer.hint_for(&catalyst), DEFAULT_DEVICE_TYPE);
    }
}
