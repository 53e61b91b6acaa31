//! Ordered-fallback field access over the three loosely-typed provider payloads.
//!
//! Every output field names the key each provider uses for it (or none). A
//! lookup walks the providers in precedence order and stops at the first
//! usable value, so resolution never depends on which payloads are present.

use serde_json::{Map, Value};

pub type Payload = Map<String, Value>;

/// Per-provider key for one logical field, in precedence order.
#[derive(Debug, Clone, Copy)]
pub struct FieldKeys {
    pub ip_sb: Option<&'static str>,
    pub ip_api: Option<&'static str>,
    pub freeipapi: Option<&'static str>,
}

impl FieldKeys {
    pub const fn new(
        ip_sb: Option<&'static str>,
        ip_api: Option<&'static str>,
        freeipapi: Option<&'static str>,
    ) -> Self {
        Self { ip_sb, ip_api, freeipapi }
    }
}

pub const COUNTRY: FieldKeys = FieldKeys::new(Some("country"), Some("country"), Some("countryName"));
pub const COUNTRY_CODE: FieldKeys = FieldKeys::new(Some("country_code"), Some("countryCode"), Some("countryCode"));
pub const REGION: FieldKeys = FieldKeys::new(Some("region"), Some("regionName"), Some("regionName"));
pub const REGION_CODE: FieldKeys = FieldKeys::new(Some("region_code"), Some("region"), None);
pub const CITY: FieldKeys = FieldKeys::new(Some("city"), Some("city"), Some("cityName"));
pub const LATITUDE: FieldKeys = FieldKeys::new(Some("latitude"), Some("lat"), Some("latitude"));
pub const LONGITUDE: FieldKeys = FieldKeys::new(Some("longitude"), Some("lon"), Some("longitude"));
pub const ISP: FieldKeys = FieldKeys::new(Some("isp"), Some("isp"), Some("isp"));
pub const ASN: FieldKeys = FieldKeys::new(Some("asn"), Some("as"), Some("asn"));
pub const ORG: FieldKeys = FieldKeys::new(Some("organization"), Some("org"), Some("organization"));
pub const TIMEZONE: FieldKeys = FieldKeys::new(Some("timezone"), Some("timezone"), Some("timeZone"));
pub const OFFSET: FieldKeys = FieldKeys::new(Some("offset"), Some("offset"), Some("timeZoneOffset"));
pub const BOGON: FieldKeys = FieldKeys::new(Some("bogon"), Some("bogon"), Some("bogon"));
pub const MOBILE: FieldKeys = FieldKeys::new(None, Some("mobile"), None);
pub const PROXY: FieldKeys = FieldKeys::new(None, Some("proxy"), Some("isProxy"));
pub const CRAWLER: FieldKeys = FieldKeys::new(None, None, Some("isCrawler"));

/// The three provider payloads for one address; `None` marks a failed provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponses {
    pub ip_sb: Option<Payload>,
    pub ip_api: Option<Payload>,
    pub freeipapi: Option<Payload>,
}

impl ProviderResponses {
    pub fn new(ip_sb: Option<Payload>, ip_api: Option<Payload>, freeipapi: Option<Payload>) -> Self {
        Self { ip_sb, ip_api, freeipapi }
    }

    /// First usable value for the field, or `None` when no provider has one.
    pub fn resolve(&self, keys: &FieldKeys) -> Option<&Value> {
        [
            (self.ip_sb.as_ref(), keys.ip_sb),
            (self.ip_api.as_ref(), keys.ip_api),
            (self.freeipapi.as_ref(), keys.freeipapi),
        ]
        .into_iter()
        .filter_map(|(payload, key)| payload?.get(key?))
        .find(|value| is_usable(value))
    }

    pub fn string(&self, keys: &FieldKeys) -> Option<String> {
        self.resolve(keys).and_then(value_as_string)
    }

    pub fn string_or(&self, keys: &FieldKeys, default: &str) -> String {
        self.string(keys).unwrap_or_else(|| default.to_string())
    }

    pub fn number_or(&self, keys: &FieldKeys, default: f64) -> f64 {
        self.resolve(keys).and_then(value_as_f64).unwrap_or(default)
    }

    pub fn flag(&self, keys: &FieldKeys) -> bool {
        self.resolve(keys).map(value_as_bool).unwrap_or(false)
    }

    /// A single provider's flag, outside the fallback chain.
    pub fn provider_flag(payload: Option<&Payload>, key: &str) -> bool {
        payload.and_then(|p| p.get(key)).map(value_as_bool).unwrap_or(false)
    }

    /// A single provider's non-empty string, outside the fallback chain.
    pub fn provider_string(payload: Option<&Payload>, key: &str) -> Option<String> {
        payload
            .and_then(|p| p.get(key))
            .filter(|v| is_usable(v))
            .and_then(value_as_string)
    }
}

/// Null, blank strings, `false` and numeric zero count as "not supplied".
fn is_usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Option<Payload> {
        value.as_object().cloned()
    }

    #[test]
    fn test_first_provider_wins() {
        let responses = ProviderResponses::new(
            payload(json!({"country": "Germany"})),
            payload(json!({"country": "France"})),
            payload(json!({"countryName": "Spain"})),
        );
        assert_eq!(responses.string_or(&COUNTRY, "Unknown"), "Germany");
    }

    #[test]
    fn test_empty_values_fall_through() {
        let responses = ProviderResponses::new(
            payload(json!({"country": "", "city": null, "latitude": 0})),
            None,
            payload(json!({"countryName": "Spain", "cityName": "Madrid", "latitude": 40.4})),
        );
        assert_eq!(responses.string_or(&COUNTRY, "Unknown"), "Spain");
        assert_eq!(responses.string_or(&CITY, "Unknown"), "Madrid");
        assert_eq!(responses.number_or(&LATITUDE, 0.0), 40.4);
    }

    #[test]
    fn test_defaults_when_nothing_resolves() {
        let responses = ProviderResponses::default();
        assert_eq!(responses.string_or(&ISP, "Unknown"), "Unknown");
        assert_eq!(responses.number_or(&LONGITUDE, 0.0), 0.0);
        assert!(!responses.flag(&PROXY));
        assert!(responses.resolve(&REGION_CODE).is_none());
    }

    #[test]
    fn test_numeric_asn_becomes_string() {
        let responses = ProviderResponses::new(payload(json!({"asn": 15169})), None, None);
        assert_eq!(responses.string_or(&ASN, "Unknown"), "15169");
    }

    #[test]
    fn test_numeric_strings_are_parsed() {
        let responses = ProviderResponses::new(None, None, payload(json!({"longitude": "-122.07"})));
        assert_eq!(responses.number_or(&LONGITUDE, 0.0), -122.07);
    }

    #[test]
    fn test_flag_uses_any_later_true() {
        let responses = ProviderResponses::new(
            None,
            payload(json!({"proxy": false})),
            payload(json!({"isProxy": true})),
        );
        assert!(responses.flag(&PROXY));
    }

    #[test]
    fn test_provider_accessors() {
        let p = payload(json!({"hosting": true, "type": "  ", "proxyType": "VPN"}));
        assert!(ProviderResponses::provider_flag(p.as_ref(), "hosting"));
        assert!(!ProviderResponses::provider_flag(p.as_ref(), "mobile"));
        assert!(ProviderResponses::provider_string(p.as_ref(), "type").is_none());
        assert_eq!(
            ProviderResponses::provider_string(p.as_ref(), "proxyType").as_deref(),
            Some("VPN")
        );
        assert!(!ProviderResponses::provider_flag(None, "hosting"));
    }
}
