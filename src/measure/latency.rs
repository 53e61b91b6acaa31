use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Method};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::stats::{LatencyStats, latency_stats};
use crate::catalog::{PingTarget, PingTargets, TargetCategory};
use crate::error::{Error, Result};

pub const CATALOG_PING_TIMEOUT: Duration = Duration::from_secs(5);
pub const CATALOG_PING_GAP: Duration = Duration::from_millis(300);
const GOOD_LATENCY_MS: u64 = 100;
const FAIR_LATENCY_MS: u64 = 300;

/// Something that can time one round trip to a host.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(&self, host: &str) -> Result<Duration>;
}

/// Times a small HTTP request for the host's favicon. Any HTTP answer counts,
/// including error statuses; only transport failures are errors.
#[derive(Debug, Clone)]
pub struct HttpRoundTrip {
    client: Client,
    method: Method,
}

impl HttpRoundTrip {
    /// GET with a random cache buster, as used by the jitter probe.
    pub fn get(client: Client) -> Self {
        Self { client, method: Method::GET }
    }

    /// HEAD, as used by the connectivity check.
    pub fn head(client: Client) -> Self {
        Self { client, method: Method::HEAD }
    }
}

#[async_trait]
impl RoundTrip for HttpRoundTrip {
    async fn round_trip(&self, host: &str) -> Result<Duration> {
        let url = format!("https://{}/favicon.ico", host);
        let t = chrono::Utc::now().timestamp_millis().to_string();
        let ping = rand::rng().random::<f64>().to_string();

        let start = Instant::now();
        let response = self
            .client
            .request(self.method.clone(), &url)
            .query(&[("t", t.as_str()), ("ping", ping.as_str())])
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| Error::ProbeTransport { target: host.to_string(), reason: e.to_string() })?;
        let elapsed = start.elapsed();

        log::trace!("[measure::latency] round_trip: host={} status={} elapsed={}ms",
            host, response.status(), elapsed.as_millis());
        Ok(elapsed)
    }
}

async fn timed(rtt: &dyn RoundTrip, host: &str, timeout: Duration) -> Result<Duration> {
    match tokio::time::timeout(timeout, rtt.round_trip(host)).await {
        Ok(result) => result,
        Err(_) => Err(Error::ProbeTimeout { target: host.to_string(), timeout }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    #[serde(flatten)]
    pub stats: LatencyStats,
    /// Successful round trips in milliseconds, in probe order
    pub latencies: Vec<f64>,
}

/// Sequential latency/jitter probe over a fixed target list.
pub struct LatencyProber {
    rtt: Arc<dyn RoundTrip>,
    targets: Vec<String>,
    timeout: Duration,
    gap: Duration,
}

impl LatencyProber {
    pub fn new(rtt: Arc<dyn RoundTrip>, targets: Vec<String>, timeout: Duration, gap: Duration) -> Self {
        log::debug!("[measure::latency] new: targets={} timeout={}ms gap={}ms",
            targets.len(), timeout.as_millis(), gap.as_millis());
        Self { rtt, targets, timeout, gap }
    }

    /// Probe each target in order, never overlapping. Failed probes add no sample.
    pub async fn run(&self) -> LatencyReport {
        let mut latencies = Vec::with_capacity(self.targets.len());

        for (i, host) in self.targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.gap).await;
            }
            match timed(self.rtt.as_ref(), host, self.timeout).await {
                Ok(elapsed) => latencies.push(elapsed.as_secs_f64() * 1000.0),
                Err(e) => log::warn!("[measure::latency] probe_excluded: host={} error={}", host, e),
            }
        }

        let stats = latency_stats(&latencies);
        if !stats.measured {
            log::warn!("[measure::latency] no_samples: targets={} using_fallback=true", self.targets.len());
        }
        log::debug!("[measure::latency] run_completed: samples={} average={}ms jitter={}ms",
            latencies.len(), stats.average, stats.jitter);
        LatencyReport { stats, latencies }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PingGrade {
    Good,
    Fair,
    Slow,
    Unreachable,
}

impl PingGrade {
    pub fn from_latency(latency_ms: Option<u64>) -> Self {
        match latency_ms {
            Some(ms) if ms < GOOD_LATENCY_MS => PingGrade::Good,
            Some(ms) if ms < FAIR_LATENCY_MS => PingGrade::Fair,
            Some(_) => PingGrade::Slow,
            None => PingGrade::Unreachable,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PingReport {
    pub host: &'static str,
    pub name: &'static str,
    pub category: TargetCategory,
    pub latency_ms: Option<u64>,
    pub grade: PingGrade,
    pub error: Option<String>,
}

/// Connectivity check over the ping catalog: one probe per target, in catalog probe order.
pub async fn ping_catalog(rtt: &dyn RoundTrip, targets: &PingTargets, timeout: Duration, gap: Duration) -> Vec<PingReport> {
    let mut reports = Vec::new();
    for (i, target) in targets.in_probe_order().enumerate() {
        if i > 0 {
            tokio::time::sleep(gap).await;
        }
        reports.push(ping_one(rtt, target, timeout).await);
    }
    reports
}

async fn ping_one(rtt: &dyn RoundTrip, target: &PingTarget, timeout: Duration) -> PingReport {
    let (latency_ms, error) = match timed(rtt, target.host, timeout).await {
        Ok(elapsed) => (Some(elapsed.as_millis() as u64), None),
        Err(e) => {
            log::debug!("[measure::latency] ping_failed: host={} error={}", target.host, e);
            (None, Some(e.to_string()))
        }
    };
    PingReport {
        host: target.host,
        name: target.name,
        category: target.category,
        latency_ms,
        grade: PingGrade::from_latency(latency_ms),
        error,
    }
}
