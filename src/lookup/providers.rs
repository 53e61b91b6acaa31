use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::fields::Payload;
use crate::error::{Error, Result};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
// ip-api.com numeric field mask selecting every field including mobile/proxy/hosting
const IP_API_FIELDS: u32 = 66846719;

/// A third-party geolocation source.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Provider identifier, also the key used in `sources`
    fn name(&self) -> &'static str;

    /// Fetch the raw payload for an address. Any failure means "no data".
    async fn fetch(&self, ip: &str) -> Result<Payload>;
}

/// Shared request path: GET, require a success status, require a JSON object body.
async fn fetch_object(client: &Client, provider: &'static str, url: &str, accept_json: bool) -> Result<Payload> {
    log::debug!("[lookup::providers] fetch_object: provider={} url={}", provider, url);

    let mut request = client.get(url).header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT);
    if accept_json {
        request = request.header(reqwest::header::ACCEPT, "application/json");
    }

    let unavailable = |reason: String| Error::ProviderUnavailable { provider, reason };

    let response = request.send().await.map_err(|e| unavailable(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(unavailable(format!("status {}", status)));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| unavailable(format!("malformed body: {}", e)))?;

    match body {
        Value::Object(map) => Ok(map),
        other => Err(unavailable(format!("expected JSON object, got {}", json_kind(&other)))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// api.ip.sb: first in precedence.
#[derive(Debug, Clone)]
pub struct IpSbProvider {
    client: Client,
    base_url: String,
}

impl IpSbProvider {
    pub fn new(client: Client) -> Self {
        Self { client, base_url: "https://api.ip.sb/geoip".to_string() }
    }
}

#[async_trait]
impl GeoProvider for IpSbProvider {
    fn name(&self) -> &'static str {
        "ip_sb"
    }

    async fn fetch(&self, ip: &str) -> Result<Payload> {
        let url = format!("{}/{}", self.base_url, ip);
        fetch_object(&self.client, self.name(), &url, true).await
    }
}

/// ip-api.com: supplies the hosting/proxy/mobile flags used for classification.
#[derive(Debug, Clone)]
pub struct IpApiProvider {
    client: Client,
    base_url: String,
}

impl IpApiProvider {
    pub fn new(client: Client) -> Self {
        Self { client, base_url: "http://ip-api.com/json".to_string() }
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    fn name(&self) -> &'static str {
        "ip_api"
    }

    async fn fetch(&self, ip: &str) -> Result<Payload> {
        let url = format!("{}/{}?fields={}", self.base_url, ip, IP_API_FIELDS);
        let payload = fetch_object(&self.client, self.name(), &url, false).await?;
        check_ip_api_status(payload)
    }
}

/// ip-api.com answers 200 with `"status":"fail"` for reserved or invalid addresses.
fn check_ip_api_status(payload: Payload) -> Result<Payload> {
    match payload.get("status").and_then(Value::as_str) {
        Some("fail") => {
            let reason = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("failure status")
                .to_string();
            Err(Error::ProviderUnavailable { provider: "ip_api", reason })
        }
        _ => Ok(payload),
    }
}

/// freeipapi.com: last in precedence; supplies proxy type and crawler flags.
#[derive(Debug, Clone)]
pub struct FreeIpApiProvider {
    client: Client,
    base_url: String,
}

impl FreeIpApiProvider {
    pub fn new(client: Client) -> Self {
        Self { client, base_url: "https://freeipapi.com/api/json".to_string() }
    }
}

#[async_trait]
impl GeoProvider for FreeIpApiProvider {
    fn name(&self) -> &'static str {
        "freeipapi"
    }

    async fn fetch(&self, ip: &str) -> Result<Payload> {
        let url = format!("{}/{}", self.base_url, ip);
        fetch_object(&self.client, self.name(), &url, false).await
    }
}
