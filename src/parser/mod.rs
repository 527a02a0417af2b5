//! Command output parsing
//!
//! Turns raw `show` command text into typed facts. The traversal engine
//! only sees the [`OutputParser`] trait.

pub mod cisco;

use crate::device::{DeviceIdentity, NeighborRef};
use crate::error::ParseResult;

pub use cisco::CiscoParser;

/// Parses identity and neighbor facts out of raw command output
pub trait OutputParser: Send + Sync {
    /// Parse `show version` output
    fn parse_identity(&self, raw: &str) -> ParseResult<DeviceIdentity>;

    /// Parse `show cdp neighbors detail` output
    ///
    /// An empty list means the device has no neighbors; malformed output
    /// is an error.
    fn parse_neighbors(&self, raw: &str) -> ParseResult<Vec<NeighborRef>>;
}
