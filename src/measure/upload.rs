//! Placeholder upload metric.
//!
//! No upload is performed. The value is drawn from its own random baseline and
//! never derived from the download measurement; results are always flagged as
//! simulated.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;

use super::stats::round2;

pub const SIMULATED_DURATION: Duration = Duration::from_secs(2);
const BASELINE_MIN_MBPS: f64 = 20.0;
const BASELINE_SPAN_MBPS: f64 = 50.0;
const UPLOAD_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEstimate {
    pub speed: f64,
    pub is_simulated: bool,
}

pub fn estimate_with<R: Rng + ?Sized>(rng: &mut R) -> UploadEstimate {
    let baseline = BASELINE_MIN_MBPS + rng.random::<f64>() * BASELINE_SPAN_MBPS;
    UploadEstimate {
        speed: round2(baseline * UPLOAD_RATIO),
        is_simulated: true,
    }
}

/// Pause for the simulated test duration, then produce an estimate.
pub async fn simulate(pause: Duration) -> UploadEstimate {
    tokio::time::sleep(pause).await;
    let estimate = estimate_with(&mut rand::rng());
    log::debug!("[measure::upload] simulated: speed={}Mbps", estimate.speed);
    estimate
}
