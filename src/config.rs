//! Configuration-file loading.
//!
//! An ini-style document with `[Identity]`/`[TCPIP]`/`[UCMM]`/`[Originator]`
//! sections (§6). Section/key parsing is handled by the `ini` crate; values
//! noted as JSON literals (EPATH, the route table, the interface
//! configuration struct) are decoded with `serde_json` after being pulled
//! out as a raw string.

use std::collections::BTreeMap;
use std::time::Duration;

use ini::Ini;
use serde::Deserialize;

use crate::codec::TypeTag;
use crate::epath::{EPath, Link, Segment};
use crate::error::{CipError, Result};

#[derive(Debug, Clone)]
pub struct IdentitySection {
    pub vendor_number: u16,
    pub device_type: u16,
    pub product_code_number: u16,
    pub product_revision: (u8, u8),
    pub status_word: u16,
    pub serial_number: u32,
    pub product_name: String,
    pub state: u8,
    pub configuration_consistency_value: u16,
    pub heartbeat_interval: u16,
}

impl Default for IdentitySection {
    fn default() -> Self {
        IdentitySection {
            vendor_number: 1,
            device_type: 0x0E,
            product_code_number: 100,
            product_revision: (1, 0),
            status_word: 0x0030,
            serial_number: 0x0000_0001,
            product_name: "Rust EtherNet/IP Simulator".to_string(),
            state: 3,
            configuration_consistency_value: 0,
            heartbeat_interval: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfiguration {
    pub ip_address: String,
    pub gateway_address: String,
    pub network_mask: String,
    pub dns_primary: String,
    pub dns_secondary: String,
    pub domain_name: String,
}

impl Default for InterfaceConfiguration {
    fn default() -> Self {
        InterfaceConfiguration {
            ip_address: "0.0.0.0".to_string(),
            gateway_address: "0.0.0.0".to_string(),
            network_mask: "255.255.255.0".to_string(),
            dns_primary: "0.0.0.0".to_string(),
            dns_secondary: "0.0.0.0".to_string(),
            domain_name: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TcpipSection {
    pub interface_status: u32,
    pub configuration_capability: u32,
    pub configuration_control: u32,
    pub host_name: String,
    pub path_to_physical_link: EPath,
    pub interface_configuration: InterfaceConfiguration,
}

impl Default for TcpipSection {
    fn default() -> Self {
        TcpipSection {
            interface_status: 1,
            configuration_capability: 0x04,
            configuration_control: 0,
            host_name: "enip-cip".to_string(),
            path_to_physical_link: EPath::new(vec![Segment::Port { port: 1, link: Link::Number(0) }]),
            interface_configuration: InterfaceConfiguration::default(),
        }
    }
}

/// `[UCMM] Route Path` — the single route_path the dispatcher accepts when
/// no `Route` table is configured.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutePathPolicy {
    /// `null` — accept any route_path.
    Any,
    /// `false` — only an empty route_path is accepted.
    EmptyOnly,
    /// An explicit EPATH that must match exactly.
    Exact(EPath),
}

/// One entry of the `[UCMM] Route` table: the leading `{port, link}` (link
/// possibly a range) mapped to a downstream `host:port`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub port: u16,
    pub link_low: u32,
    pub link_high: u32,
    pub downstream: String,
}

impl RouteEntry {
    pub fn matches(&self, port: u16, link: u32) -> bool {
        self.port == port && link >= self.link_low && link <= self.link_high
    }
}

#[derive(Debug, Clone)]
pub struct UcmmSection {
    pub route_path: RoutePathPolicy,
    pub route: Vec<RouteEntry>,
    pub fragment_size: usize,
}

impl Default for UcmmSection {
    fn default() -> Self {
        UcmmSection {
            route_path: RoutePathPolicy::Any,
            route: Vec::new(),
            fragment_size: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OriginatorSection {
    pub timeout: Duration,
    pub multiple_service_packet_budget: usize,
    pub depth: usize,
}

impl Default for OriginatorSection {
    fn default() -> Self {
        OriginatorSection {
            timeout: Duration::from_secs(5),
            multiple_service_packet_budget: 0,
            depth: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyInstanceConfig {
    pub instance: u16,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyConfig {
    pub instances: Vec<AssemblyInstanceConfig>,
}

/// One `SCADA@22/1/1=INT[1000]`-style tag declaration.
#[derive(Debug, Clone)]
pub struct TagDef {
    pub name: String,
    pub bound_class: Option<u16>,
    pub bound_instance: Option<u16>,
    pub bound_attribute: Option<u16>,
    pub type_tag: TypeTag,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    pub identity: IdentitySection,
    pub tcpip: TcpipSection,
    pub ucmm: UcmmSection,
    pub originator: OriginatorSection,
    pub assembly: Option<AssemblyConfig>,
    pub tags: Vec<TagDef>,
}

// `IdentitySection`/`TcpipSection`/`UcmmSection`/`OriginatorSection` all
// implement `Default` above; `DeviceConfig`'s derive picks those up.

fn get_int(section: &ini::Properties, key: &str, default: i64) -> Result<i64> {
    match section.get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| CipError::Configuration(format!("'{key}' is not an integer: {v}"))),
        None => Ok(default),
    }
}

fn get_str(section: &ini::Properties, key: &str, default: &str) -> String {
    section.get(key).unwrap_or(default).to_string()
}

fn get_json<T: for<'de> Deserialize<'de>>(section: &ini::Properties, key: &str) -> Result<Option<T>> {
    match section.get(key) {
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| CipError::Configuration(format!("invalid JSON for '{key}': {e}"))),
        None => Ok(None),
    }
}

/// Parse an EPATH given either as a JSON array of `{"class": n}`-style
/// segment objects, the literal `null`, or the literal `false`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RoutePathJson {
    Path(Vec<BTreeMap<String, serde_json::Value>>),
    Disabled(bool),
}

fn parse_route_path_policy(raw: &str) -> Result<RoutePathPolicy> {
    let trimmed = raw.trim();
    if trimmed == "null" {
        return Ok(RoutePathPolicy::Any);
    }
    let parsed: RoutePathJson = serde_json::from_str(trimmed)
        .map_err(|e| CipError::Configuration(format!("invalid Route Path JSON: {e}")))?;
    match parsed {
        RoutePathJson::Disabled(false) => Ok(RoutePathPolicy::EmptyOnly),
        RoutePathJson::Disabled(true) => Err(CipError::Configuration(
            "Route Path boolean literal must be `false`".into(),
        )),
        RoutePathJson::Path(segments) => {
            let mut path = Vec::new();
            for seg in segments {
                if let Some(v) = seg.get("class").and_then(|v| v.as_u64()) {
                    path.push(Segment::Class(v as u32));
                } else if let Some(v) = seg.get("instance").and_then(|v| v.as_u64()) {
                    path.push(Segment::Instance(v as u32));
                } else if let Some(v) = seg.get("attribute").and_then(|v| v.as_u64()) {
                    path.push(Segment::Attribute(v as u32));
                } else if let Some(v) = seg.get("connection").and_then(|v| v.as_u64()) {
                    path.push(Segment::Connection(v as u32));
                } else {
                    return Err(CipError::Configuration("unrecognized Route Path segment".into()));
                }
            }
            Ok(RoutePathPolicy::Exact(EPath::new(path)))
        }
    }
}

fn parse_route_table(raw: &str) -> Result<Vec<RouteEntry>> {
    let map: BTreeMap<String, String> = serde_json::from_str(raw)
        .map_err(|e| CipError::Configuration(format!("invalid Route JSON: {e}")))?;
    let mut entries = Vec::new();
    for (key, downstream) in map {
        let mut parts = key.splitn(2, '/');
        let port: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CipError::Configuration(format!("invalid Route key '{key}'")))?;
        let link_part = parts
            .next()
            .ok_or_else(|| CipError::Configuration(format!("invalid Route key '{key}'")))?;
        let (link_low, link_high) = if let Some((lo, hi)) = link_part.split_once('-') {
            let lo: u32 = lo
                .parse()
                .map_err(|_| CipError::Configuration(format!("invalid Route link range '{key}'")))?;
            let hi: u32 = hi
                .parse()
                .map_err(|_| CipError::Configuration(format!("invalid Route link range '{key}'")))?;
            (lo, hi)
        } else if let Ok(n) = link_part.parse::<u32>() {
            (n, n)
        } else {
            // An IP-address link literal; stored as its u32 dotted-decimal
            // value so `matches` can still compare numerically.
            let octets: Vec<u8> = link_part
                .split('.')
                .map(|o| o.parse().unwrap_or(0))
                .collect();
            let value = octets
                .iter()
                .fold(0u32, |acc, &o| (acc << 8) | o as u32);
            (value, value)
        };
        entries.push(RouteEntry {
            port,
            link_low,
            link_high,
            downstream,
        });
    }
    Ok(entries)
}

impl DeviceConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| CipError::Configuration(format!("failed to load '{}': {e}", path.display())))?;
        Self::from_ini(&ini)
    }

    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let mut config = DeviceConfig::default();

        if let Some(section) = ini.section(Some("Identity")) {
            config.identity.vendor_number = get_int(section, "Vendor Number", config.identity.vendor_number as i64)? as u16;
            config.identity.device_type = get_int(section, "Device Type", config.identity.device_type as i64)? as u16;
            config.identity.product_code_number =
                get_int(section, "Product Code Number", config.identity.product_code_number as i64)? as u16;
            if let Some(raw) = section.get("Product Revision") {
                let (major, minor) = raw
                    .split_once('.')
                    .ok_or_else(|| CipError::Configuration("Product Revision must be MAJOR.MINOR".into()))?;
                config.identity.product_revision = (major.trim().parse().unwrap_or(1), minor.trim().parse().unwrap_or(0));
            }
            config.identity.status_word = get_int(section, "Status Word", config.identity.status_word as i64)? as u16;
            config.identity.serial_number = get_int(section, "Serial Number", config.identity.serial_number as i64)? as u32;
            config.identity.product_name = get_str(section, "Product Name", &config.identity.product_name);
            config.identity.state = get_int(section, "State", config.identity.state as i64)? as u8;
            config.identity.configuration_consistency_value =
                get_int(section, "Configuration Consistency Value", 0)? as u16;
            config.identity.heartbeat_interval =
                get_int(section, "Heartbeat Interval", config.identity.heartbeat_interval as i64)? as u16;
        }

        if let Some(section) = ini.section(Some("TCPIP")) {
            config.tcpip.interface_status = get_int(section, "Interface Status", config.tcpip.interface_status as i64)? as u32;
            config.tcpip.configuration_capability =
                get_int(section, "Configuration Capability", config.tcpip.configuration_capability as i64)? as u32;
            config.tcpip.configuration_control =
                get_int(section, "Configuration Control", config.tcpip.configuration_control as i64)? as u32;
            config.tcpip.host_name = get_str(section, "Host Name", &config.tcpip.host_name);
            if let Some(interface_config) = get_json::<InterfaceConfiguration>(section, "Interface Configuration")? {
                config.tcpip.interface_configuration = interface_config;
            }
            // "Path to Physical Link" reuses the same JSON segment shape as
            // `[UCMM] Route Path`, minus the `null`/`false` literals.
            if let Some(raw) = section.get("Path to Physical Link") {
                if let RoutePathPolicy::Exact(path) = parse_route_path_policy(raw)? {
                    config.tcpip.path_to_physical_link = path;
                }
            }
        }

        if let Some(section) = ini.section(Some("UCMM")) {
            if let Some(raw) = section.get("Route Path") {
                config.ucmm.route_path = parse_route_path_policy(raw)?;
            }
            if let Some(raw) = section.get("Route") {
                config.ucmm.route = parse_route_table(raw)?;
            }
            config.ucmm.fragment_size = get_int(section, "Fragment Size", config.ucmm.fragment_size as i64)? as usize;
        }

        if let Some(section) = ini.section(Some("Originator")) {
            let timeout_ms = get_int(section, "Timeout", config.originator.timeout.as_millis() as i64)?;
            config.originator.timeout = Duration::from_millis(timeout_ms as u64);
            config.originator.multiple_service_packet_budget =
                get_int(section, "Multiple Service Packet", 0)? as usize;
            config.originator.depth = get_int(section, "Depth", config.originator.depth as i64)? as usize;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let config = DeviceConfig::default();
        assert_eq!(config.ucmm.route_path, RoutePathPolicy::Any);
        assert_eq!(config.originator.depth, 1);
    }

    #[test]
    fn parses_identity_and_route_sections() {
        let text = r#"
[Identity]
Vendor Number = 7
Product Name = Test Device
Serial Number = 12345

[UCMM]
Route Path = false
Route = {"1/0-10": "10.0.0.5:44818"}
"#;
        let ini = Ini::load_from_str(text).unwrap();
        let config = DeviceConfig::from_ini(&ini).unwrap();
        assert_eq!(config.identity.vendor_number, 7);
        assert_eq!(config.identity.product_name, "Test Device");
        assert_eq!(config.ucmm.route_path, RoutePathPolicy::EmptyOnly);
        assert_eq!(config.ucmm.route.len(), 1);
        assert!(config.ucmm.route[0].matches(1, 5));
        assert!(!config.ucmm.route[0].matches(1, 11));
    }
}
