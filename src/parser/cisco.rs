//! Parser for Cisco IOS / IOS-XE / NX-OS command output
//!
//! Only the fields the crawler persists are extracted. Missing fields are
//! left empty; output that carries none of them is rejected.

use crate::device::{DeviceIdentity, NeighborRef, SHOW_CDP_NEIGHBORS, SHOW_VERSION};
use crate::error::{ParseError, ParseResult};
use crate::parser::OutputParser;
use regex::Regex;
use std::sync::LazyLock;

static DEVICE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Device name:\s*(\S+)").expect("Invalid device name regex"));

static UPTIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(\S+)\s+uptime is\s+(.+?)\s*$").expect("Invalid uptime regex")
});

static NXOS_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:NXOS|system):\s+version\s+(\S+)").expect("Invalid NX-OS version regex")
});

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bVersion\s+([^\s,]+)").expect("Invalid version regex"));

static PROCESSOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*cisco\s+(\S+)\s+\([^)]*\)\s+processor").expect("Invalid processor regex")
});

static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*Model number\s*:\s*(\S+)").expect("Invalid model regex")
});

static CHASSIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*cisco\s+(.+?)\s+chassis").expect("Invalid chassis regex")
});

static SERIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:Processor board ID|System serial number\s*:)\s*(\S+)")
        .expect("Invalid serial regex")
});

static CONFIG_REGISTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*Configuration register is\s+(\S+)").expect("Invalid config register regex")
});

static MAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*Base ethernet MAC Address\s*:\s*(\S+)").expect("Invalid MAC regex")
});

static DEVICE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Device ID[ \t]*:[ \t]*(.*?)[ \t]*$").expect("Invalid device ID regex")
});

static IP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:IP address|IPv4 Address)\s*:\s*(\S+)").expect("Invalid IP regex")
});

static MGMT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:Management|Mgmt) address\(es\)\s*:").expect("Invalid management regex")
});

static PLATFORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*Platform[ \t]*:[ \t]*([^,\n]*?)[ \t]*(?:,|$)").expect("Invalid platform regex")
});

static CAPABILITIES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)Capabilities[ \t]*:[ \t]*(.*?)[ \t]*$").expect("Invalid capabilities regex")
});

static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*Interface[ \t]*:[ \t]*([^,\n]+?)[ \t]*,[ \t]*Port ID \(outgoing port\)[ \t]*:[ \t]*(.*?)[ \t]*$")
        .expect("Invalid interface regex")
});

/// Marker printed by some platforms when the neighbor table is empty
const NO_ENTRIES_MARKER: &str = "Total cdp entries displayed";

/// Regex-based parser for Cisco CLI output
#[derive(Debug, Clone, Default)]
pub struct CiscoParser;

impl CiscoParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for CiscoParser {
    fn parse_identity(&self, raw: &str) -> ParseResult<DeviceIdentity> {
        let text = normalize(raw);
        reject_error_output(SHOW_VERSION, &text)?;

        let mut identity = DeviceIdentity::default();

        if let Some(name) = capture(&DEVICE_NAME_RE, &text) {
            identity.hostname = name;
        }
        // NX-OS also prints "Kernel uptime is ..." which is not a hostname
        if let Some(caps) = UPTIME_RE
            .captures_iter(&text)
            .find(|caps| &caps[1] != "Kernel")
        {
            if identity.hostname.is_empty() {
                identity.hostname = caps[1].to_string();
            }
            identity.uptime = caps[2].to_string();
        }

        identity.version = capture(&NXOS_VERSION_RE, &text)
            .or_else(|| capture(&VERSION_RE, &text))
            .unwrap_or_default();

        identity.platform = capture(&PROCESSOR_RE, &text)
            .or_else(|| capture(&MODEL_RE, &text))
            .or_else(|| capture(&CHASSIS_RE, &text))
            .unwrap_or_default();

        identity.serial_number = capture(&SERIAL_RE, &text).unwrap_or_default();
        identity.config_register = capture(&CONFIG_REGISTER_RE, &text).unwrap_or_default();
        identity.mac_address = capture(&MAC_RE, &text).unwrap_or_default();

        if identity.is_empty() {
            return Err(ParseError::Unrecognized {
                command: SHOW_VERSION.into(),
            });
        }

        Ok(identity)
    }

    fn parse_neighbors(&self, raw: &str) -> ParseResult<Vec<NeighborRef>> {
        let text = normalize(raw);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        reject_error_output(SHOW_CDP_NEIGHBORS, &text)?;

        let starts: Vec<usize> = DEVICE_ID_RE.find_iter(&text).map(|m| m.start()).collect();
        if starts.is_empty() {
            if text.contains(NO_ENTRIES_MARKER) {
                return Ok(Vec::new());
            }
            return Err(ParseError::Unrecognized {
                command: SHOW_CDP_NEIGHBORS.into(),
            });
        }

        starts
            .iter()
            .enumerate()
            .map(|(index, &start)| {
                let end = starts.get(index + 1).copied().unwrap_or(text.len());
                parse_neighbor_block(index, &text[start..end])
            })
            .collect()
    }
}

fn parse_neighbor_block(index: usize, block: &str) -> ParseResult<NeighborRef> {
    let device_id = capture(&DEVICE_ID_RE, block).unwrap_or_default();
    if device_id.is_empty() {
        return Err(ParseError::MalformedEntry {
            index,
            field: "device id",
        });
    }

    // Prefer the management address when the device advertises one
    let address = MGMT_RE
        .find(block)
        .and_then(|m| capture(&IP_RE, &block[m.end()..]))
        .or_else(|| capture(&IP_RE, block))
        .unwrap_or_default();

    let (local_interface, neighbor_interface) = INTERFACE_RE
        .captures(block)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .unwrap_or_default();

    Ok(NeighborRef {
        device_id,
        address,
        platform: capture(&PLATFORM_RE, block).unwrap_or_default(),
        local_interface,
        neighbor_interface,
        capabilities: capture(&CAPABILITIES_RE, block).unwrap_or_default(),
    })
}

/// Strip carriage returns from SSH output
fn normalize(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// IOS reports errors as a line starting with '%'
fn reject_error_output(command: &str, text: &str) -> ParseResult<()> {
    match text.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) if line.starts_with('%') => Err(ParseError::UnexpectedOutput {
            command: command.to_string(),
            line: line.to_string(),
        }),
        Some(_) => Ok(()),
        None => Err(ParseError::Unrecognized {
            command: command.to_string(),
        }),
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOS_VERSION: &str = "\
Cisco IOS Software, C3750E Software (C3750E-UNIVERSALK9-M), Version 15.0(2)SE11, RELEASE SOFTWARE (fc3)
Technical Support: http://www.cisco.com/techsupport
Copyright (c) 1986-2017 by Cisco Systems, Inc.

ROM: Bootstrap program is C3750E boot loader
BOOTLDR: C3750E Boot Loader (C3750X-HBOOT-M) Version 12.2(58r)SE, RELEASE SOFTWARE (fc1)

dist-sw1 uptime is 2 years, 12 weeks, 3 days, 4 hours, 9 minutes
System returned to ROM by power-on
System image file is \"flash:/c3750e-universalk9-mz.150-2.SE11.bin\"

cisco WS-C3750X-48P (PowerPC405) processor (revision A0) with 262144K bytes of memory.
Processor board ID FDO1234X5YZ
Last reset from power-on
Base ethernet MAC Address       : 00:1A:2B:3C:4D:5E
Model number                    : WS-C3750X-48P-S
System serial number            : FDO1234X5YZ

Configuration register is 0xF
";

    const NXOS_VERSION: &str = "\
Cisco Nexus Operating System (NX-OS) Software
TAC support: http://www.cisco.com/tac
Software
  BIOS: version 07.69
  NXOS: version 9.3(5)
Hardware
  cisco Nexus9000 C93180YC-EX chassis
  Intel(R) Xeon(R) CPU  @ 1.80GHz with 24632252 kB of memory.
  Processor Board ID FDO22281ABC

  Device name: nx-core-1
  bootflash:   53298520 kB
Kernel uptime is 102 day(s), 3 hour(s), 2 minute(s), 13 second(s)
";

    const IOS_CDP: &str = "\
-------------------------
Device ID: core-rtr1.example.com
Entry address(es):
  IP address: 10.0.0.1
Platform: cisco ISR4331/K9,  Capabilities: Router Switch IGMP
Interface: GigabitEthernet1/0/49,  Port ID (outgoing port): GigabitEthernet0/0/1
Holdtime : 133 sec

Version :
Cisco IOS Software [Fuji], ISR Software (X86_64_LINUX_IOSD-UNIVERSALK9-M), Version 16.9.3

advertisement version: 2
Management address(es):
  IP address: 192.168.100.1

-------------------------
Device ID: access-sw2
Entry address(es):
  IP address: 10.0.0.22
Platform: cisco WS-C2960X-24PS-L,  Capabilities: Switch IGMP
Interface: GigabitEthernet1/0/2,  Port ID (outgoing port): GigabitEthernet1/0/52
Holdtime : 165 sec

";

    const NXOS_CDP: &str = "\
----------------------------------------
Device ID:nx-leaf-2(FDO2228XYZ)
System Name: nx-leaf-2

Interface address(es):
    IPv4 Address: 10.1.1.2
Platform: N9K-C93180YC-EX, Capabilities: Router Switch IGMP Filtering Supports-STP-Dispute
Interface: Ethernet1/49, Port ID (outgoing port): Ethernet1/49
Holdtime: 171 sec

Mgmt address(es):
    IPv4 Address: 172.16.0.12
";

    #[test]
    fn test_parse_ios_identity() {
        let identity = CiscoParser::new().parse_identity(IOS_VERSION).unwrap();
        assert_eq!(identity.hostname, "dist-sw1");
        assert_eq!(identity.version, "15.0(2)SE11");
        assert_eq!(identity.platform, "WS-C3750X-48P");
        assert_eq!(identity.serial_number, "FDO1234X5YZ");
        assert_eq!(identity.config_register, "0xF");
        assert_eq!(identity.mac_address, "00:1A:2B:3C:4D:5E");
        assert!(identity.uptime.starts_with("2 years"));
    }

    #[test]
    fn test_parse_nxos_identity() {
        let identity = CiscoParser::new().parse_identity(NXOS_VERSION).unwrap();
        assert_eq!(identity.hostname, "nx-core-1");
        assert_eq!(identity.version, "9.3(5)");
        assert_eq!(identity.platform, "Nexus9000 C93180YC-EX");
        assert_eq!(identity.serial_number, "FDO22281ABC");
    }

    #[test]
    fn test_identity_partial_fields_are_empty() {
        let identity = CiscoParser::new()
            .parse_identity("edge-1 uptime is 5 minutes\n")
            .unwrap();
        assert_eq!(identity.hostname, "edge-1");
        assert_eq!(identity.serial_number, "");
        assert_eq!(identity.platform, "");
    }

    #[test]
    fn test_identity_rejects_error_output() {
        let parser = CiscoParser::new();
        let err = parser
            .parse_identity("% Invalid input detected at '^' marker.\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedOutput { .. }));

        assert!(matches!(
            parser.parse_identity("").unwrap_err(),
            ParseError::Unrecognized { .. }
        ));
        assert!(matches!(
            parser.parse_identity("nothing useful here").unwrap_err(),
            ParseError::Unrecognized { .. }
        ));
    }

    #[test]
    fn test_parse_ios_neighbors() {
        let neighbors = CiscoParser::new().parse_neighbors(IOS_CDP).unwrap();
        assert_eq!(neighbors.len(), 2);

        let rtr = &neighbors[0];
        assert_eq!(rtr.device_id, "core-rtr1.example.com");
        assert_eq!(rtr.address, "192.168.100.1");
        assert_eq!(rtr.platform, "cisco ISR4331/K9");
        assert_eq!(rtr.capabilities, "Router Switch IGMP");
        assert_eq!(rtr.local_interface, "GigabitEthernet1/0/49");
        assert_eq!(rtr.neighbor_interface, "GigabitEthernet0/0/1");

        let sw = &neighbors[1];
        assert_eq!(sw.device_id, "access-sw2");
        assert_eq!(sw.address, "10.0.0.22");
        assert_eq!(sw.platform, "cisco WS-C2960X-24PS-L");
    }

    #[test]
    fn test_parse_nxos_neighbors() {
        let neighbors = CiscoParser::new().parse_neighbors(NXOS_CDP).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].device_id, "nx-leaf-2(FDO2228XYZ)");
        assert_eq!(neighbors[0].address, "172.16.0.12");
        assert_eq!(neighbors[0].platform, "N9K-C93180YC-EX");
        assert_eq!(neighbors[0].local_interface, "Ethernet1/49");
    }

    #[test]
    fn test_parse_neighbors_crlf_output() {
        let crlf = IOS_CDP.replace('\n', "\r\n");
        let neighbors = CiscoParser::new().parse_neighbors(&crlf).unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[1].neighbor_interface, "GigabitEthernet1/0/52");
    }

    #[test]
    fn test_empty_neighbor_output() {
        let parser = CiscoParser::new();
        assert!(parser.parse_neighbors("").unwrap().is_empty());
        assert!(parser.parse_neighbors("\r\n  \n").unwrap().is_empty());
        assert!(parser
            .parse_neighbors("\nTotal cdp entries displayed : 0\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_neighbor_output() {
        let parser = CiscoParser::new();

        let err = parser.parse_neighbors("% CDP is not enabled\n").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedOutput { .. }));

        let err = parser.parse_neighbors("garbage without entries").unwrap_err();
        assert!(matches!(err, ParseError::Unrecognized { .. }));

        let err = parser
            .parse_neighbors("Device ID:\n  IP address: 10.0.0.9\n")
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedEntry {
                index: 0,
                field: "device id"
            }
        );
    }

    #[test]
    fn test_neighbor_without_address_is_kept() {
        let neighbors = CiscoParser::new()
            .parse_neighbors("Device ID: phone-1\nPlatform: Cisco IP Phone 8841,  Capabilities: Host Phone\n")
            .unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].address, "");
        assert_eq!(neighbors[0].capabilities, "Host Phone");
    }
}
