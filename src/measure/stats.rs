use serde::Serialize;

const TRIM_FRACTION: f64 = 0.2;
pub const FALLBACK_AVERAGE_MS: i64 = 50;
pub const FALLBACK_JITTER_MS: f64 = 10.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean after dropping the lowest and highest 20% of samples by index.
///
/// Falls back to the plain mean when trimming leaves nothing; zero samples give 0.
pub fn trimmed_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let start = (sorted.len() as f64 * TRIM_FRACTION).floor() as usize;
    let end = (sorted.len() as f64 * (1.0 - TRIM_FRACTION)).floor() as usize;
    let kept = &sorted[start..end.max(start)];

    if kept.is_empty() { mean(&sorted) } else { mean(kept) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Mean round trip, whole milliseconds
    pub average: i64,
    /// Population standard deviation, two decimals
    pub jitter: f64,
    /// False when no probe answered and the fixed fallback was returned
    pub measured: bool,
}

impl LatencyStats {
    pub const FALLBACK: LatencyStats = LatencyStats {
        average: FALLBACK_AVERAGE_MS,
        jitter: FALLBACK_JITTER_MS,
        measured: false,
    };
}

pub fn latency_stats(latencies_ms: &[f64]) -> LatencyStats {
    if latencies_ms.is_empty() {
        return LatencyStats::FALLBACK;
    }

    let average = mean(latencies_ms);
    let variance = latencies_ms.iter().map(|l| (l - average).powi(2)).sum::<f64>() / latencies_ms.len() as f64;

    LatencyStats {
        average: average.round() as i64,
        jitter: round2(variance.sqrt()),
        measured: true,
    }
}
