//! Client-side network measurements: download throughput, latency/jitter,
//! the simulated upload figure, and the session that sequences them.

pub mod download;
pub mod latency;
pub mod session;
pub mod stats;
pub mod upload;
pub mod window;

pub use download::{DownloadProbe, DownloadResult, SpeedSampler};
pub use latency::{HttpRoundTrip, LatencyProber, LatencyReport, PingGrade, PingReport, RoundTrip, ping_catalog};
pub use session::{MeasurementState, SpeedUnit, SpeedtestReport, SpeedtestSession};
pub use stats::{LatencyStats, latency_stats, trimmed_mean};
pub use upload::UploadEstimate;
pub use window::{SpeedSample, SpeedWindow};
