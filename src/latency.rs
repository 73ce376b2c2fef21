use crate::model::LatencyStats;

/// Nearest-rank percentile of an ascending sample: `sorted[ceil(pct * n / 100) - 1]`.
///
/// The rank is computed in integer arithmetic so the same sample always yields the
/// same element, independent of floating point rounding. Returns 0 for an empty sample.
pub fn percentile(sorted: &[f64], pct: u32) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (pct.min(100) as usize * n).div_ceil(100);
    sorted[rank.clamp(1, n) - 1]
}

impl LatencyStats {
    /// Summarise a sample of latencies in milliseconds.
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return LatencyStats::default();
        }
        samples.sort_by(f64::total_cmp);

        let sum: f64 = samples.iter().sum();
        LatencyStats {
            avg: sum / samples.len() as f64,
            min: samples[0],
            max: samples[samples.len() - 1],
            p50: percentile(&samples, 50),
            p95: percentile(&samples, 95),
            p99: percentile(&samples, 99),
        }
    }
}
