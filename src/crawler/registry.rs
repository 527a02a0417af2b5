//! Deduplication of device addresses
//!
//! Devices are reported under slightly different spellings (trailing dots,
//! upper-case hostnames, zero-padded octets). Addresses are normalized
//! before they are admitted so each device is visited once.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

/// Canonical form of a device address
///
/// Trimmed, trailing dot removed, IP literals rewritten to canonical text,
/// anything else lower-cased.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('.');
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    if let Some(ip) = parse_padded_ipv4(unbracketed) {
        return ip.to_string();
    }
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return ip.to_string();
    }
    trimmed.to_lowercase()
}

/// Parse dotted-quad IPv4, tolerating leading zeros ("010.000.000.001")
fn parse_padded_ipv4(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Concurrent set of admitted addresses
#[derive(Debug, Default)]
pub struct VisitedRegistry {
    admitted: Mutex<HashSet<String>>,
}

impl VisitedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an address if it has not been seen
    ///
    /// Test-and-set under one lock: of any number of concurrent callers
    /// with the same address, exactly one gets true. Empty addresses are
    /// never admitted.
    pub fn try_admit(&self, address: &str) -> bool {
        let key = normalize_address(address);
        if key.is_empty() {
            return false;
        }
        self.admitted.lock().insert(key)
    }

    /// Check membership without admitting
    ///
    /// Only a hint: the answer can be stale by the time it is used.
    pub fn contains(&self, address: &str) -> bool {
        let key = normalize_address(address);
        self.admitted.lock().contains(&key)
    }

    pub fn len(&self) -> usize {
        self.admitted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.lock().is_empty()
    }

    /// Admitted addresses in sorted order
    pub fn snapshot(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.admitted.lock().iter().cloned().collect();
        addresses.sort();
        addresses
    }
}
