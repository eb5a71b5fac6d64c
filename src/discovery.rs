use std::collections::HashMap;
use std::net::IpAddr;

use serde::Deserialize;

const MDNS_ID_LEN: usize = 12;

/// A zero-configuration service advertisement.
///
/// Build it directly from a resolver's output, or deserialize it from a plain
/// key/value mapping such as `{"hostname": "...", "port": 80, "properties": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub host: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub port: Option<u16>,
    pub properties: HashMap<String, String>,
}

impl ServiceInfo {
    pub fn from_json(value: &serde_json::Value) -> crate::Result<Self> {
        Ok(Self::deserialize(value)?)
    }
}

/// Only advertisements whose service name mentions Homevolt are accepted.
pub fn is_homevolt_service(info: &ServiceInfo) -> bool {
    info.name
        .as_deref()
        .is_some_and(|name| name.to_ascii_lowercase().contains("homevolt"))
}

pub fn extract_hostname(info: &ServiceInfo) -> Option<&str> {
    non_empty(info.hostname.as_deref()).or_else(|| non_empty(info.name.as_deref()))
}

/// Best address for contacting the device: host, then hostname, then IP.
pub fn extract_ip_or_host(info: &ServiceInfo) -> Option<String> {
    non_empty(info.host.as_deref())
        .or_else(|| non_empty(info.hostname.as_deref()))
        .map(str::to_string)
        .or_else(|| info.ip_address.map(|ip| ip.to_string()))
}

pub fn extract_port(info: &ServiceInfo) -> Option<u16> {
    info.port.filter(|p| *p != 0)
}

pub fn build_base_url(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if port != 80 => format!("http://{host}:{port}"),
        _ => format!("http://{host}"),
    }
}

/// The device id embedded in the hostname, e.g. `homevolt-68b6b34e70a0.local`.
///
/// Only a run of exactly 12 hex characters counts; shorter or longer runs
/// are not ids.
pub fn extract_mdns_id(info: &ServiceInfo) -> Option<String> {
    let hostname = extract_hostname(info)?;
    hostname
        .split(|c: char| !c.is_ascii_hexdigit())
        .find(|run| run.len() == MDNS_ID_LEN)
        .map(str::to_ascii_lowercase)
}

/// MAC address from the `deviceid` property, as `aa:bb:cc:dd:ee:ff`.
pub fn extract_mac(info: &ServiceInfo) -> Option<String> {
    let raw = info.properties.get("deviceid")?;
    format_mac(raw)
}

pub fn format_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if hex.len() != MDNS_ID_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.to_ascii_lowercase();
    let octets: Vec<&str> = (0..MDNS_ID_LEN).step_by(2).map(|i| &hex[i..i + 2]).collect();
    Some(octets.join(":"))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}
