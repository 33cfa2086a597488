/// Throughput summary over repeated runs, in tasks per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSummary {
    pub runs: usize,
    pub best: f64,
    pub worst: f64,
    pub mean: f64,
    /// Sample standard deviation; zero with fewer than two runs.
    pub stdev: f64,
}

impl ThroughputSummary {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let runs = samples.len();
        let best = samples.iter().copied().fold(f64::MIN, f64::max);
        let worst = samples.iter().copied().fold(f64::MAX, f64::min);
        let mean = samples.iter().sum::<f64>() / runs as f64;
        let stdev = if runs > 1 {
            let variance = samples
                .iter()
                .map(|s| (s - mean).powi(2))
                .sum::<f64>()
                / (runs - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(ThroughputSummary {
            runs,
            best,
            worst,
            mean,
            stdev,
        })
    }
}
