use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::stats::{round2, trimmed_mean};
use super::window::{SpeedSample, SpeedWindow};
use crate::error::{Error, Result};

/// Samples taken before this much transfer time are too noisy to keep.
pub const WARMUP: Duration = Duration::from_millis(500);
const BYTES_PER_MEGABIT: f64 = 1_048_576.0;

pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    (bytes as f64 * 8.0) / elapsed.as_secs_f64() / BYTES_PER_MEGABIT
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    /// Trimmed-mean throughput in Mbps, two decimals
    pub speed: f64,
    pub total_bytes: u64,
    /// Every sample in arrival order
    pub samples: Vec<f64>,
}

/// Turns cumulative progress into throughput samples.
#[derive(Debug, Default)]
pub struct SpeedSampler {
    started: Option<Instant>,
    total_bytes: u64,
    samples: Vec<f64>,
    window: SpeedWindow,
}

impl SpeedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a progress event. The first event marks time zero; a sample is
    /// produced once more than [`WARMUP`] has elapsed.
    pub fn observe(&mut self, total_bytes: u64, now: Instant) -> Option<SpeedSample> {
        let started = *self.started.get_or_insert(now);
        self.total_bytes = total_bytes;

        let elapsed = now.saturating_duration_since(started);
        if elapsed <= WARMUP {
            return None;
        }

        let sample = SpeedSample {
            time: elapsed.as_secs_f64(),
            speed: mbps(total_bytes, elapsed),
        };
        self.samples.push(sample.speed);
        self.window.push(sample);
        Some(sample)
    }

    pub fn window(&self) -> &SpeedWindow {
        &self.window
    }

    pub fn finish(self) -> DownloadResult {
        DownloadResult {
            speed: round2(trimmed_mean(&self.samples)),
            total_bytes: self.total_bytes,
            samples: self.samples,
        }
    }
}

/// Drive a stream of chunk sizes to completion, publishing samples as they appear.
///
/// A closed or full sample channel never stalls the transfer.
pub async fn sample_transfer<S>(chunks: S, expected_size: u64, events: mpsc::Sender<SpeedSample>) -> Result<DownloadResult>
where
    S: Stream<Item = Result<u64>>,
{
    let mut sampler = SpeedSampler::new();
    let mut loaded = 0u64;
    futures::pin_mut!(chunks);

    while let Some(chunk) = chunks.next().await {
        loaded += chunk?;
        if let Some(sample) = sampler.observe(loaded, Instant::now()) {
            let progress = if expected_size > 0 {
                (loaded as f64 / expected_size as f64 * 100.0).min(99.0)
            } else {
                0.0
            };
            log::trace!("[measure::download] sample: time={:.2}s speed={:.2}Mbps progress={:.0}%",
                sample.time, sample.speed, progress);
            if events.try_send(sample).is_err() {
                log::trace!("[measure::download] sample_not_delivered: time={:.2}s", sample.time);
            }
        }
    }

    let result = sampler.finish();
    log::debug!("[measure::download] transfer_completed: bytes={} samples={} speed={}Mbps",
        result.total_bytes, result.samples.len(), result.speed);
    Ok(result)
}

/// Race a probe step against cancellation and an absolute deadline.
pub async fn guarded<T, F>(step: F, deadline: Instant, timeout: Duration, cancel: &CancellationToken, target: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log::info!("[measure::download] cancelled: target={}", target);
            Err(Error::Cancelled)
        }
        outcome = tokio::time::timeout_at(deadline, step) => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::ProbeTimeout { target: target.to_string(), timeout }),
        },
    }
}

fn transport(target: &str, reason: impl std::fmt::Display) -> Error {
    Error::ProbeTransport { target: target.to_string(), reason: reason.to_string() }
}

/// Download throughput probe against one test file.
#[derive(Debug, Clone)]
pub struct DownloadProbe {
    client: Client,
    timeout: Duration,
}

impl DownloadProbe {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open the transfer. A cache-busting parameter keeps proxies out of the measurement.
    pub async fn connect(&self, url: &str) -> Result<Response> {
        log::debug!("[measure::download] connect: url={}", url);
        let nocache = chrono::Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(url)
            .query(&[("nocache", nocache.as_str())])
            .send()
            .await
            .map_err(|e| transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport(url, format!("status {}", status)));
        }
        Ok(response)
    }

    pub async fn transfer(&self, response: Response, expected_size: u64, events: mpsc::Sender<SpeedSample>) -> Result<DownloadResult> {
        let url = response.url().to_string();
        let chunks = response
            .bytes_stream()
            .map(move |chunk| chunk.map(|bytes| bytes.len() as u64).map_err(|e| transport(&url, e)));
        sample_transfer(chunks, expected_size, events).await
    }
}
