use rand::Rng;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::download::{DownloadProbe, DownloadResult, guarded};
use super::latency::{LatencyProber, LatencyReport};
use super::stats::{LatencyStats, round2};
use super::upload::{self, UploadEstimate};
use super::window::{SpeedSample, SpeedWindow};
use crate::catalog::{self, SpeedtestServer};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeasurementState {
    Idle,
    Connecting,
    DownloadTesting,
    UploadTesting,
    LatencyTesting,
    Completed,
    Cancelled,
    Failed,
}

impl MeasurementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementState::Idle => "idle",
            MeasurementState::Connecting => "connecting",
            MeasurementState::DownloadTesting => "download_testing",
            MeasurementState::UploadTesting => "upload_testing",
            MeasurementState::LatencyTesting => "latency_testing",
            MeasurementState::Completed => "completed",
            MeasurementState::Cancelled => "cancelled",
            MeasurementState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MeasurementState::Completed | MeasurementState::Cancelled | MeasurementState::Failed)
    }

    pub fn can_transition_to(&self, next: MeasurementState) -> bool {
        use MeasurementState::*;
        match (self, next) {
            (Idle, Connecting)
            | (Connecting, DownloadTesting)
            | (DownloadTesting, UploadTesting)
            | (UploadTesting, LatencyTesting)
            | (LatencyTesting, Completed)
            | (Connecting | DownloadTesting, Failed) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for MeasurementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SpeedUnit {
    #[default]
    Mbps,
    #[serde(rename = "MB/s")]
    MegabytesPerSecond,
    Kbps,
}

impl SpeedUnit {
    /// Express a Mbps figure in this unit.
    pub fn convert(&self, mbps: f64) -> f64 {
        match self {
            SpeedUnit::Mbps => mbps,
            SpeedUnit::MegabytesPerSecond => mbps * 0.125,
            SpeedUnit::Kbps => mbps * 1000.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedUnit::Mbps => "Mbps",
            SpeedUnit::MegabytesPerSecond => "MB/s",
            SpeedUnit::Kbps => "Kbps",
        }
    }
}

impl std::str::FromStr for SpeedUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mbps" => Ok(SpeedUnit::Mbps),
            "mb/s" | "mbs" | "mbytes" => Ok(SpeedUnit::MegabytesPerSecond),
            "kbps" => Ok(SpeedUnit::Kbps),
            other => Err(Error::validation(format!("unknown speed unit: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedtestReport {
    pub server: &'static str,
    /// Download throughput in Mbps
    pub download: f64,
    pub total_bytes: u64,
    pub upload: UploadEstimate,
    pub latency: LatencyStats,
    pub curve: Vec<SpeedSample>,
    /// True when the numbers are synthetic stand-ins for a failed measurement
    pub simulated: bool,
    pub failure: Option<String>,
}

/// Explicit per-run context: selected server, display unit, cancellation handle and state.
pub struct SpeedtestSession {
    server: &'static SpeedtestServer,
    unit: SpeedUnit,
    state: MeasurementState,
    cancel: CancellationToken,
    window: SpeedWindow,
    samples: Option<mpsc::Sender<SpeedSample>>,
}

impl SpeedtestSession {
    pub fn new(server_id: Option<&str>, unit: SpeedUnit) -> Self {
        Self {
            server: catalog::find_server(server_id),
            unit,
            state: MeasurementState::Idle,
            cancel: CancellationToken::new(),
            window: SpeedWindow::default(),
            samples: None,
        }
    }

    pub fn server(&self) -> &'static SpeedtestServer {
        self.server
    }

    pub fn unit(&self) -> SpeedUnit {
        self.unit
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    pub fn window(&self) -> &SpeedWindow {
        &self.window
    }

    /// Handle for stopping the run from elsewhere (e.g. a Ctrl-C handler).
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Live download samples for the next [`run`](Self::run). The stream ends
    /// once that run's download phase is over.
    pub fn samples(&mut self) -> ReceiverStream<SpeedSample> {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        self.samples = Some(tx);
        ReceiverStream::new(rx)
    }

    pub fn advance(&mut self, next: MeasurementState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition { from: self.state.as_str(), to: next.as_str() });
        }
        log::debug!("[measure::session] transition: from={} to={}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn cancelled(&mut self) -> Error {
        if !self.state.is_terminal() {
            self.state = MeasurementState::Cancelled;
        }
        Error::Cancelled
    }

    /// Run download, simulated upload and latency phases.
    ///
    /// A transport failure or timeout while connecting or downloading moves the
    /// session to `Failed` and yields a synthetic report flagged `simulated`.
    /// Cancellation moves it to `Cancelled` and returns `Err(Cancelled)`.
    pub async fn run(&mut self, download: &DownloadProbe, latency: &LatencyProber) -> Result<SpeedtestReport> {
        let forward = self.samples.take();
        self.advance(MeasurementState::Connecting)?;
        log::info!("[measure::session] run: server={} url={} live={}", self.server.id, self.server.url, forward.is_some());

        let (tx, mut rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let relay = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(sample) = rx.recv().await {
                if let Some(out) = &forward {
                    if out.try_send(sample).is_err() {
                        log::trace!("[measure::session] sample_dropped: time={:.2}s", sample.time);
                    }
                }
                seen.push(sample);
            }
            seen
        });

        let outcome = self.download_phase(download, tx).await;
        let seen = relay.await.unwrap_or_default();
        for sample in seen {
            self.window.push(sample);
        }

        let download = match outcome {
            Ok(result) => result,
            Err(Error::Cancelled) => return Err(self.cancelled()),
            Err(e) if e.is_probe_failure() => {
                log::error!("[measure::session] download_failed: server={} error={}", self.server.id, e);
                self.advance(MeasurementState::Failed)?;
                return Ok(self.synthetic_report(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let cancel = self.cancel.clone();
        self.advance(MeasurementState::UploadTesting)?;
        let upload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled()),
            estimate = upload::simulate(upload::SIMULATED_DURATION) => estimate,
        };

        self.advance(MeasurementState::LatencyTesting)?;
        let latency: LatencyReport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled()),
            report = latency.run() => report,
        };

        self.advance(MeasurementState::Completed)?;
        log::info!("[measure::session] completed: download={}Mbps upload={}Mbps latency={}ms jitter={}ms",
            download.speed, upload.speed, latency.stats.average, latency.stats.jitter);

        Ok(SpeedtestReport {
            server: self.server.id,
            download: download.speed,
            total_bytes: download.total_bytes,
            upload,
            latency: latency.stats,
            curve: self.window.points().copied().collect(),
            simulated: false,
            failure: None,
        })
    }

    async fn download_phase(&mut self, probe: &DownloadProbe, events: mpsc::Sender<SpeedSample>) -> Result<DownloadResult> {
        let url = self.server.url;
        let deadline = tokio::time::Instant::now() + probe.timeout();
        let cancel = self.cancel.clone();

        let response = guarded(probe.connect(url), deadline, probe.timeout(), &cancel, url).await?;
        self.advance(MeasurementState::DownloadTesting)?;
        guarded(probe.transfer(response, self.server.size, events), deadline, probe.timeout(), &cancel, url).await
    }

    fn synthetic_report(&mut self, reason: String) -> SpeedtestReport {
        let report = synthetic_report_with(&mut rand::rng(), self.server.id, reason);
        self.window = SpeedWindow::default();
        for sample in &report.curve {
            self.window.push(*sample);
        }
        report
    }
}

const SAMPLE_CHANNEL_CAPACITY: usize = 64;
const SYNTHETIC_POINTS: usize = 20;
const SYNTHETIC_STEP_SECS: f64 = 0.5;

/// Clearly-labelled stand-in numbers shown when the download could not be measured.
pub fn synthetic_report_with<R: Rng + ?Sized>(rng: &mut R, server: &'static str, reason: String) -> SpeedtestReport {
    let base = 50.0 + rng.random::<f64>() * 100.0;
    let curve = (0..SYNTHETIC_POINTS)
        .map(|i| SpeedSample {
            time: i as f64 * SYNTHETIC_STEP_SECS,
            speed: base * (0.5 + rng.random::<f64>() * 0.5),
        })
        .collect();

    SpeedtestReport {
        server,
        download: round2(base),
        total_bytes: 0,
        upload: upload::estimate_with(rng),
        latency: LatencyStats {
            average: (20.0 + rng.random::<f64>() * 30.0).floor() as i64,
            jitter: round2(2.0 + rng.random::<f64>() * 5.0),
            measured: false,
        },
        curve,
        simulated: true,
        failure: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::latency::RoundTrip;
    use async_trait::async_trait;
    use futures::StreamExt;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SERVED_CHUNK: usize = 4096;

    struct InstantRoundTrip;

    #[async_trait]
    impl RoundTrip for InstantRoundTrip {
        async fn round_trip(&self, _host: &str) -> Result<Duration> {
            Ok(Duration::from_millis(15))
        }
    }

    fn latency_prober() -> LatencyProber {
        LatencyProber::new(
            Arc::new(InstantRoundTrip),
            vec!["a".to_string()],
            Duration::from_secs(3),
            Duration::from_millis(500),
        )
    }

    /// Loopback HTTP server answering one request with `chunks` bodies of
    /// [`SERVED_CHUNK`] bytes, one every 100ms.
    async fn paced_server(chunks: usize) -> &'static SpeedtestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;

            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                chunks * SERVED_CHUNK
            );
            if socket.write_all(header.as_bytes()).await.is_err() {
                return;
            }
            let body = vec![0u8; SERVED_CHUNK];
            for _ in 0..chunks {
                if socket.write_all(&body).await.is_err() || socket.flush().await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        Box::leak(Box::new(SpeedtestServer {
            id: "local",
            name: "Local",
            url: Box::leak(format!("http://{}/file.bin", addr).into_boxed_str()),
            size: (chunks * SERVED_CHUNK) as u64,
        }))
    }

    fn local_download() -> DownloadProbe {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        DownloadProbe::new(client, Duration::from_secs(30))
    }

    #[test]
    fn test_state_transitions() {
        use MeasurementState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(DownloadTesting));
        assert!(LatencyTesting.can_transition_to(Completed));
        assert!(DownloadTesting.can_transition_to(Failed));
        assert!(!UploadTesting.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Completed));
        assert!(!DownloadTesting.can_transition_to(LatencyTesting));

        for state in [Idle, Connecting, DownloadTesting, UploadTesting, LatencyTesting] {
            assert!(state.can_transition_to(Cancelled), "{} should cancel", state);
        }
        for state in [Completed, Cancelled, Failed] {
            assert!(!state.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn test_session_rejects_invalid_transition() {
        let mut session = SpeedtestSession::new(None, SpeedUnit::Mbps);
        let err = session.advance(MeasurementState::Completed).unwrap_err();
        assert_eq!(err.to_string(), "invalid measurement transition from idle to completed");
        assert_eq!(session.state(), MeasurementState::Idle);
    }

    #[test]
    fn test_speed_units() {
        assert_eq!(SpeedUnit::Mbps.convert(80.0), 80.0);
        assert_eq!(SpeedUnit::MegabytesPerSecond.convert(80.0), 10.0);
        assert_eq!(SpeedUnit::Kbps.convert(1.5), 1500.0);
        assert_eq!("MB/s".parse::<SpeedUnit>().unwrap(), SpeedUnit::MegabytesPerSecond);
        assert!("gbps".parse::<SpeedUnit>().is_err());
    }

    #[test]
    fn test_synthetic_report_is_labelled() {
        let mut rng = StdRng::seed_from_u64(1);
        let report = synthetic_report_with(&mut rng, "ovh", "probe to x timed out".to_string());
        assert!(report.simulated);
        assert!(report.upload.is_simulated);
        assert!(!report.latency.measured);
        assert_eq!(report.failure.as_deref(), Some("probe to x timed out"));
        assert_eq!(report.curve.len(), 20);
        assert_eq!(report.curve[19].time, 9.5);
        assert!(report.download >= 50.0 && report.download <= 150.0);
        assert!(report.latency.average >= 20 && report.latency.average < 50);
        assert!(report.latency.jitter >= 2.0 && report.latency.jitter <= 7.0);
    }

    #[tokio::test]
    async fn test_cancel_before_download_completes() {
        let mut session = SpeedtestSession::new(Some("cloudflare"), SpeedUnit::Mbps);
        session.cancel_handle().cancel();

        let probe = DownloadProbe::new(reqwest::Client::new(), Duration::from_secs(30));
        let result = session.run(&probe, &latency_prober()).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(session.state(), MeasurementState::Cancelled);
        assert!(session.window().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_falls_back_to_synthetic() {
        let mut session = SpeedtestSession::new(Some("ovh"), SpeedUnit::Mbps);
        // Port 9 on loopback refuses connections without touching the network.
        session.server = Box::leak(Box::new(SpeedtestServer {
            id: "local",
            name: "Local",
            url: "http://127.0.0.1:9/file.bin",
            size: 1024,
        }));

        let probe = DownloadProbe::new(reqwest::Client::new(), Duration::from_secs(5));
        let report = session.run(&probe, &latency_prober()).await.unwrap();

        assert_eq!(session.state(), MeasurementState::Failed);
        assert!(report.simulated);
        assert!(report.failure.is_some());
        assert_eq!(session.window().len(), 20);
    }

    #[tokio::test]
    async fn test_run_completes_against_local_server() {
        let mut session = SpeedtestSession::new(None, SpeedUnit::Mbps);
        session.server = paced_server(20).await;
        let collector = tokio::spawn(session.samples().collect::<Vec<_>>());

        let report = session.run(&local_download(), &latency_prober()).await.unwrap();
        let delivered = collector.await.unwrap();

        assert_eq!(session.state(), MeasurementState::Completed);
        assert!(!report.simulated);
        assert!(report.failure.is_none());
        assert_eq!(report.server, "local");
        assert_eq!(report.total_bytes, (20 * SERVED_CHUNK) as u64);
        assert!(report.download > 0.0);
        assert!(report.latency.measured);
        assert!(report.upload.is_simulated);
        assert!(!report.curve.is_empty());
        assert_eq!(report.curve.len(), session.window().len());
        assert!(delivered.len() >= report.curve.len());
    }

    #[tokio::test]
    async fn test_cancel_during_transfer() {
        let mut session = SpeedtestSession::new(None, SpeedUnit::Mbps);
        session.server = paced_server(1000).await;
        let collector = tokio::spawn(session.samples().collect::<Vec<_>>());

        let trigger = session.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result = session.run(&local_download(), &latency_prober()).await;
        let delivered = collector.await.unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(session.state(), MeasurementState::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!delivered.is_empty());
        assert!(!session.window().is_empty());
    }
}
