//! Public address detection for both IP families.
//!
//! Each family walks its service list in order; the first response carrying a
//! structurally valid address wins. Exhausting the list means "no address".

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::types::IpVersion;

pub const IPV4_SERVICES: [&str; 4] = [
    "https://api.ipify.org?format=json",
    "https://api4.ipify.org?format=json",
    "https://v4.ident.me/json",
    "https://api.my-ip.io/ip.json",
];

pub const IPV6_SERVICES: [&str; 4] = [
    "https://api64.ipify.org?format=json",
    "https://v6.ident.me/json",
    "https://api6.ipify.org?format=json",
    "https://api.my-ip.io/ip.json?ipv6=true",
];

pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);
const ADDRESS_KEYS: [&str; 3] = ["ip", "address", "ipAddress"];

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("valid IPv4 pattern")
});

pub fn services(version: IpVersion) -> &'static [&'static str] {
    match version {
        IpVersion::V4 => &IPV4_SERVICES,
        IpVersion::V6 => &IPV6_SERVICES,
    }
}

/// Pull the address out of a detection response, if it is valid for `version`.
pub fn extract_address(body: &Value, version: IpVersion) -> Option<String> {
    let address = ADDRESS_KEYS
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())?;

    let valid = match version {
        IpVersion::V4 => IPV4_PATTERN.is_match(address),
        IpVersion::V6 => address.contains(':'),
    };
    valid.then(|| address.to_string())
}

/// Fetches one detection service's JSON body.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn fetch(&self, service: &Url) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpAddressSource {
    client: Client,
}

impl HttpAddressSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AddressSource for HttpAddressSource {
    async fn fetch(&self, service: &Url) -> Result<Value> {
        let target = service.host_str().unwrap_or(service.as_str()).to_string();
        let transport = |reason: String| Error::ProbeTransport { target: target.clone(), reason };

        let response = self
            .client
            .get(service.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport(format!("status {}", status)));
        }
        response.json::<Value>().await.map_err(|e| transport(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectedAddresses {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

impl DetectedAddresses {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }
}

pub struct Detector {
    source: Box<dyn AddressSource>,
    attempt_timeout: Duration,
    overall_timeout: Duration,
}

impl Detector {
    pub fn new(source: Box<dyn AddressSource>, overall_timeout: Duration) -> Self {
        Self { source, attempt_timeout: ATTEMPT_TIMEOUT, overall_timeout }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Try each service for `version` in order. `None` once the list is exhausted.
    pub async fn detect_family(&self, version: IpVersion) -> Option<String> {
        for service in services(version) {
            let url = match Url::parse(service) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!("[detect] bad_service_url: url={} error={}", service, e);
                    continue;
                }
            };

            let body = match tokio::time::timeout(self.attempt_timeout, self.source.fetch(&url)).await {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    log::debug!("[detect] attempt_failed: version={} service={} error={}", version, service, e);
                    continue;
                }
                Err(_) => {
                    log::debug!("[detect] attempt_timeout: version={} service={}", version, service);
                    continue;
                }
            };

            match extract_address(&body, version) {
                Some(address) => {
                    log::info!("[detect] detected: version={} address={} service={}", version, address, service);
                    return Some(address);
                }
                None => log::debug!("[detect] invalid_address: version={} service={}", version, service),
            }
        }

        log::warn!("[detect] exhausted: version={}", version);
        None
    }

    /// Detect both families concurrently under the overall timeout.
    pub async fn detect(&self) -> Result<DetectedAddresses> {
        let both = async {
            let (ipv4, ipv6) = futures::join!(self.detect_family(IpVersion::V4), self.detect_family(IpVersion::V6));
            DetectedAddresses { ipv4, ipv6 }
        };

        tokio::time::timeout(self.overall_timeout, both).await.map_err(|_| {
            log::error!("[detect] overall_timeout: timeout={}ms", self.overall_timeout.as_millis());
            Error::DetectionTimeout(self.overall_timeout)
        })
    }
}
