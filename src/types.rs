use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "IPv4", alias = "ipv4")]
    V4,
    #[serde(rename = "IPv6", alias = "ipv6")]
    V6,
}

impl IpVersion {
    /// Infer the family from the textual address: anything with a colon is IPv6.
    pub fn infer(ip: &str) -> Self {
        if ip.contains(':') { IpVersion::V6 } else { IpVersion::V4 }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "IPv4",
            IpVersion::V6 => "IPv6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipv4" | "v4" | "4" => Ok(IpVersion::V4),
            "ipv6" | "v6" | "6" => Ok(IpVersion::V6),
            other => Err(Error::validation(format!("unsupported IP version: {}", other))),
        }
    }
}

/// Network classification of an address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IpType {
    Datacenter,
    Proxy,
    Mobile,
    #[default]
    Residential,
    /// Classification string passed through from a provider.
    Reported(String),
}

impl IpType {
    pub fn as_str(&self) -> &str {
        match self {
            IpType::Datacenter => "Datacenter",
            IpType::Proxy => "Proxy",
            IpType::Mobile => "Mobile",
            IpType::Residential => "Residential",
            IpType::Reported(s) => s,
        }
    }
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for IpType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Datacenter" => IpType::Datacenter,
            "Proxy" => IpType::Proxy,
            "Mobile" => IpType::Mobile,
            "Residential" => IpType::Residential,
            _ => IpType::Reported(s),
        }
    }
}

impl From<IpType> for String {
    fn from(t: IpType) -> Self {
        match t {
            IpType::Reported(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// Which providers answered for a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub ip_sb: bool,
    pub ip_api: bool,
    pub freeipapi: bool,
}

impl Sources {
    pub fn answered(&self) -> usize {
        [self.ip_sb, self.ip_api, self.freeipapi].iter().filter(|ok| **ok).count()
    }

    pub fn all_failed(&self) -> bool {
        self.answered() == 0
    }
}

/// Reconciled lookup result.
///
/// Deserialization is lenient so records written by older clients still load:
/// numeric `asn` values, float or string offsets and null flags are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizedIpRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub ip: String,
    #[serde(deserialize_with = "lenient::version")]
    pub ip_version: IpVersion,
    #[serde(deserialize_with = "lenient::string")]
    pub country: String,
    #[serde(deserialize_with = "lenient::string")]
    pub country_code: String,
    #[serde(deserialize_with = "lenient::string")]
    pub region: String,
    #[serde(deserialize_with = "lenient::string")]
    pub region_code: String,
    #[serde(deserialize_with = "lenient::string")]
    pub city: String,
    #[serde(deserialize_with = "lenient::float")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub longitude: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub isp: String,
    #[serde(deserialize_with = "lenient::string")]
    pub asn: String,
    #[serde(deserialize_with = "lenient::string")]
    pub org: String,
    #[serde(deserialize_with = "lenient::string")]
    pub timezone: String,
    #[serde(deserialize_with = "lenient::integer")]
    pub offset: i64,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_bogon: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_mobile: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_proxy: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_crawler: bool,
    #[serde(rename = "type", deserialize_with = "lenient::ip_type")]
    pub ip_type: IpType,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_native: bool,
    pub sources: Sources,
    #[serde(deserialize_with = "lenient::integer")]
    pub timestamp: i64,
}

impl Default for NormalizedIpRecord {
    fn default() -> Self {
        Self {
            ip: String::new(),
            ip_version: IpVersion::V4,
            country: UNKNOWN.to_string(),
            country_code: String::new(),
            region: UNKNOWN.to_string(),
            region_code: String::new(),
            city: UNKNOWN.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            isp: UNKNOWN.to_string(),
            asn: UNKNOWN.to_string(),
            org: UNKNOWN.to_string(),
            timezone: UNKNOWN.to_string(),
            offset: 0,
            is_bogon: false,
            is_mobile: false,
            is_proxy: false,
            is_crawler: false,
            ip_type: IpType::Residential,
            is_native: false,
            sources: Sources::default(),
            timestamp: 0,
        }
    }
}

/// One dual-stack detection cycle. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub ipv4: Option<NormalizedIpRecord>,
    pub ipv6: Option<NormalizedIpRecord>,
}

impl HistoryEntry {
    pub fn new(ipv4: Option<NormalizedIpRecord>, ipv6: Option<NormalizedIpRecord>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            ipv4,
            ipv6,
        }
    }
}

/// Field deserializers for [`NormalizedIpRecord`]. A present `null` maps to
/// the field's empty value.
mod lenient {
    use serde::de::{Deserializer, Error as _};
    use serde::Deserialize;
    use serde_json::Value;

    use super::{IpType, IpVersion};

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(D::Error::custom(format!("expected string or number, found {}", other))),
        }
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64().ok_or_else(|| D::Error::custom(format!("number out of range: {}", n))),
            Value::String(s) if s.trim().is_empty() => Ok(0.0),
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| D::Error::custom(format!("not a number: {:?}", s))),
            Value::Null => Ok(0.0),
            other => Err(D::Error::custom(format!("expected number, found {}", other))),
        }
    }

    pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = float(deserializer)?;
        if !value.is_finite() {
            return Err(D::Error::custom(format!("not a finite number: {}", value)));
        }
        Ok(value.round() as i64)
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(D::Error::custom(format!("not a boolean: {:?}", s))),
            },
            other => Err(D::Error::custom(format!("expected boolean, found {}", other))),
        }
    }

    pub fn version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IpVersion, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse().map_err(D::Error::custom),
            Value::Number(n) => n.to_string().parse().map_err(D::Error::custom),
            Value::Null => Ok(IpVersion::V4),
            other => Err(D::Error::custom(format!("expected IP version, found {}", other))),
        }
    }

    pub fn ip_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IpType, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s.trim().is_empty() => Ok(IpType::Residential),
            Value::String(s) => Ok(IpType::from(s)),
            Value::Null => Ok(IpType::Residential),
            other => Err(D::Error::custom(format!("expected type name, found {}", other))),
        }
    }
}
