/// Append-only metrics storage for one harness invocation.
use serde::{Deserialize, Serialize};

/// One observation: independent variable and reported metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: u64,
    pub value: f64,
}

/// One labeled line on the comparison chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub samples: Vec<Sample>,
}

/// Series in creation order, plus the shared x domain used by keyed
/// (multi-method) benchmarks.
///
/// Samples are kept exactly as encountered: no sorting, no deduplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsStore {
    series: Vec<Series>,
    shared_x: Vec<u64>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the series, or clear it if the label is already present.
    ///
    /// A restarted series keeps the position it was first created at.
    pub fn begin_series(&mut self, label: &str) {
        match self.position(label) {
            Some(idx) => self.series[idx].samples.clear(),
            None => self.series.push(Series {
                label: label.to_string(),
                samples: Vec::new(),
            }),
        }
    }

    /// Create the series if absent; existing samples are kept.
    pub fn ensure_series(&mut self, label: &str) {
        if self.position(label).is_none() {
            self.begin_series(label);
        }
    }

    /// Append a sample to `label`, creating the series if needed.
    pub fn push(&mut self, label: &str, sample: Sample) {
        let idx = match self.position(label) {
            Some(idx) => idx,
            None => {
                self.begin_series(label);
                self.series.len() - 1
            }
        };
        self.series[idx].samples.push(sample);
    }

    /// Record a value of the shared x domain. Repeats are ignored.
    pub fn record_shared_x(&mut self, x: u64) {
        if !self.shared_x.contains(&x) {
            self.shared_x.push(x);
        }
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    #[allow(dead_code)]
    pub fn get(&self, label: &str) -> Option<&Series> {
        self.position(label).map(|idx| &self.series[idx])
    }

    /// Distinct shared x values in first-seen order.
    pub fn shared_x(&self) -> &[u64] {
        &self.shared_x
    }

    /// Sorted distinct x values across every series and the shared domain.
    pub fn x_union(&self) -> Vec<u64> {
        let mut xs: Vec<u64> = self
            .series
            .iter()
            .flat_map(|s| s.samples.iter().map(|sample| sample.x))
            .chain(self.shared_x.iter().copied())
            .collect();
        xs.sort_unstable();
        xs.dedup();
        xs
    }

    pub fn sample_count(&self) -> usize {
        self.series.iter().map(|s| s.samples.len()).sum()
    }

    /// Length of the longest series.
    pub fn max_points(&self) -> usize {
        self.series
            .iter()
            .map(|s| s.samples.len())
            .max()
            .unwrap_or(0)
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.series.iter().position(|s| s.label == label)
    }
}
