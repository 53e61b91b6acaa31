pub mod classify;
pub mod fields;
pub mod merge;
pub mod providers;

pub use fields::{Payload, ProviderResponses};
pub use merge::merge;
pub use providers::{FreeIpApiProvider, GeoProvider, IpApiProvider, IpSbProvider};

use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::types::{IpVersion, NormalizedIpRecord};

/// Inbound lookup parameters as received from a caller.
#[derive(Debug, Clone, Default)]
pub struct LookupRequest {
    pub ip: Option<String>,
    pub version: Option<String>,
}

impl LookupRequest {
    pub fn new(ip: impl Into<String>, version: Option<String>) -> Self {
        Self { ip: Some(ip.into()), version }
    }

    /// Reject a missing address or an unrecognised version hint before any fetch happens.
    pub fn validate(&self) -> Result<(String, Option<IpVersion>)> {
        let ip = self
            .ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| Error::validation("ip parameter is required"))?;

        let version = match self.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(hint) => Some(hint.parse::<IpVersion>()?),
            None => None,
        };

        Ok((ip.to_string(), version))
    }
}

/// Queries the three providers concurrently and reconciles their answers.
pub struct LookupService {
    providers: [Box<dyn GeoProvider>; 3],
    timeout: Duration,
}

impl LookupService {
    /// Providers in precedence order: ip.sb, ip-api, freeipapi.
    pub fn new(providers: [Box<dyn GeoProvider>; 3], timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn from_settings(settings: &Settings) -> reqwest::Result<Self> {
        let client = settings.http_client()?;
        Ok(Self::new(
            [
                Box::new(IpSbProvider::new(client.clone())),
                Box::new(IpApiProvider::new(client.clone())),
                Box::new(FreeIpApiProvider::new(client)),
            ],
            settings.provider_timeout,
        ))
    }

    pub async fn lookup(&self, request: &LookupRequest) -> Result<NormalizedIpRecord> {
        let (ip, version) = request.validate()?;
        Ok(self.lookup_ip(&ip, version).await)
    }

    /// Never fails: unavailable providers only flip their `sources` flag.
    pub async fn lookup_ip(&self, ip: &str, version: Option<IpVersion>) -> NormalizedIpRecord {
        log::debug!("[lookup] lookup_ip: ip={} version={:?}", ip, version);
        let start = Instant::now();

        let [p1, p2, p3] = &self.providers;
        let (r1, r2, r3) = futures::join!(
            self.fetch_one(p1.as_ref(), ip),
            self.fetch_one(p2.as_ref(), ip),
            self.fetch_one(p3.as_ref(), ip),
        );

        let record = merge(ip, version, &ProviderResponses::new(r1, r2, r3));
        if record.sources.all_failed() {
            log::warn!("[lookup] all_providers_failed: ip={} duration={}ms", ip, start.elapsed().as_millis());
        } else {
            log::debug!("[lookup] lookup_completed: ip={} answered={} type={} duration={}ms",
                ip, record.sources.answered(), record.ip_type, start.elapsed().as_millis());
        }
        record
    }

    async fn fetch_one(&self, provider: &dyn GeoProvider, ip: &str) -> Option<Payload> {
        match tokio::time::timeout(self.timeout, provider.fetch(ip)).await {
            Ok(Ok(payload)) => Some(payload),
            Ok(Err(e)) => {
                log::warn!("[lookup] provider_failed: provider={} ip={} error={}", provider.name(), ip, e);
                None
            }
            Err(_) => {
                log::warn!("[lookup] provider_timeout: provider={} ip={} timeout={}ms",
                    provider.name(), ip, self.timeout.as_millis());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IpType, Sources};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct FakeProvider {
        name: &'static str,
        body: Option<Value>,
        delay: Duration,
    }

    impl FakeProvider {
        fn answering(name: &'static str, body: Value) -> Box<dyn GeoProvider> {
            Box::new(Self { name, body: Some(body), delay: Duration::ZERO })
        }

        fn failing(name: &'static str) -> Box<dyn GeoProvider> {
            Box::new(Self { name, body: None, delay: Duration::ZERO })
        }

        fn slow(name: &'static str, body: Value, delay: Duration) -> Box<dyn GeoProvider> {
            Box::new(Self { name, body: Some(body), delay })
        }
    }

    #[async_trait]
    impl GeoProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _ip: &str) -> Result<Payload> {
            tokio::time::sleep(self.delay).await;
            self.body
                .as_ref()
                .and_then(|b| b.as_object().cloned())
                .ok_or_else(|| Error::ProviderUnavailable { provider: self.name, reason: "down".to_string() })
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(matches!(LookupRequest::default().validate(), Err(Error::Validation(_))));
        assert!(matches!(LookupRequest::new("   ", None).validate(), Err(Error::Validation(_))));
        assert!(matches!(
            LookupRequest::new("1.1.1.1", Some("ipx".to_string())).validate(),
            Err(Error::Validation(_))
        ));

        let (ip, version) = LookupRequest::new(" 1.1.1.1 ", Some("ipv4".to_string())).validate().unwrap();
        assert_eq!(ip, "1.1.1.1");
        assert_eq!(version, Some(IpVersion::V4));

        let (_, version) = LookupRequest::new("::1", Some(String::new())).validate().unwrap();
        assert_eq!(version, None);
    }

    #[tokio::test]
    async fn test_lookup_tolerates_partial_failure() {
        let service = LookupService::new(
            [
                FakeProvider::failing("ip_sb"),
                FakeProvider::answering("ip_api", json!({"country": "Canada", "hosting": true})),
                FakeProvider::answering("freeipapi", json!({"cityName": "Toronto"})),
            ],
            Duration::from_secs(1),
        );

        let record = service.lookup(&LookupRequest::new("142.250.1.1", None)).await.unwrap();
        assert_eq!(record.country, "Canada");
        assert_eq!(record.city, "Toronto");
        assert_eq!(record.ip_type, IpType::Datacenter);
        assert_eq!(record.sources, Sources { ip_sb: false, ip_api: true, freeipapi: true });
    }

    #[tokio::test]
    async fn test_lookup_all_failed_returns_defaults() {
        let service = LookupService::new(
            [
                FakeProvider::failing("ip_sb"),
                FakeProvider::failing("ip_api"),
                FakeProvider::failing("freeipapi"),
            ],
            Duration::from_secs(1),
        );

        let record = service.lookup_ip("2001:db8::1", None).await;
        assert!(record.sources.all_failed());
        assert_eq!(record.ip_version, IpVersion::V6);
        assert_eq!(record.country, "Unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_times_out_slow_provider() {
        let service = LookupService::new(
            [
                FakeProvider::slow("ip_sb", json!({"country": "Chile"}), Duration::from_secs(60)),
                FakeProvider::answering("ip_api", json!({"country": "Peru"})),
                FakeProvider::failing("freeipapi"),
            ],
            Duration::from_secs(10),
        );

        let record = service.lookup_ip("200.1.1.1", None).await;
        assert_eq!(record.country, "Peru");
        assert!(!record.sources.ip_sb);
    }

    #[tokio::test]
    async fn test_lookup_rejects_missing_ip() {
        let service = LookupService::new(
            [
                FakeProvider::failing("ip_sb"),
                FakeProvider::failing("ip_api"),
                FakeProvider::failing("freeipapi"),
            ],
            Duration::from_secs(1),
        );
        let result = service.lookup(&LookupRequest::default()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
