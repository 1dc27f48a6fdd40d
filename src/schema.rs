/// Metric schemas: the declarative description of one kind of benchmark output.
///
/// A schema owns the ordered marker table consulted by the line classifier,
/// plus everything the renderer needs to label and size the chart. One
/// parser/renderer core is driven by these values instead of a separate
/// pipeline per benchmark kind.
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which family of benchmark output a schema parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkKind {
    /// `Testing : <name>` headers followed by `Threads: N, Ops/ms: X.Y` rows.
    Throughput,
    /// `Memory Testing: <name>` headers followed by `Threads: N, ..., Delta Memory: X MB` rows.
    Memory,
    /// `Matrix size: NxN` headers followed by `<Method>: T ms` rows.
    Matrix,
}

impl std::fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkKind::Throughput => write!(f, "throughput"),
            BenchmarkKind::Memory => write!(f, "memory"),
            BenchmarkKind::Matrix => write!(f, "matrix"),
        }
    }
}

/// How the metric value is pulled out of a data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionMode {
    /// The x value and the metric value are numeric tokens at fixed positions.
    ///
    /// When `fraction_index` is set, the value is reassembled as
    /// `<value token>.<fraction token>` (output printed as `12.345` tokenizes
    /// into `12` and `345`).
    Positional {
        x_index: usize,
        value_index: usize,
        fraction_index: Option<usize>,
        min_tokens: usize,
    },
    /// The x value is the first numeric token; the metric value is the last
    /// colon-delimited field with its unit suffix stripped.
    TrailingField { min_tokens: usize },
}

/// What a marker in the table identifies.
#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    /// Starts a new series; the label follows the marker.
    SeriesHeader,
    /// Sets the shared x value (matrix size) for the keyed rows that follow.
    SizeHeader,
    /// A sample row for the active series.
    DataRow(ExtractionMode),
    /// A single method's result, e.g. `Basic: 120 ms`.
    Keyed {
        method: String,
        pattern: KeyedPattern,
    },
}

/// Compiled `<method>: <number>` matcher for one keyed method.
#[derive(Debug, Clone)]
pub struct KeyedPattern(Regex);

impl KeyedPattern {
    /// Anchored on a word boundary so `Parallel:` does not match inside a
    /// longer label such as `Semi-Parallel:`.
    pub fn new(method: &str) -> Self {
        let escaped = regex::escape(method);
        let re = Regex::new(&format!(r"(?:^|[^\w-]){escaped}:\s*(\d+(?:\.\d+)?)"))
            .expect("escaped method label is a valid pattern");
        Self(re)
    }

    /// The numeric text following the method label, if present.
    pub fn value<'l>(&self, line: &'l str) -> Option<&'l str> {
        self.0
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

impl PartialEq for KeyedPattern {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

/// One entry of the ordered marker table. First match wins.
#[derive(Debug, Clone)]
pub struct MarkerRule {
    pub marker: String,
    pub kind: RowKind,
}

/// Scale applied to the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisScale {
    Linear,
    Log2,
}

/// Figure dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureSizing {
    Fixed {
        width: u32,
        height: u32,
    },
    /// Width grows with the largest number of points in any series.
    ScaleWithPoints {
        base_width: u32,
        per_point: u32,
        height: u32,
    },
}

impl FigureSizing {
    /// Resolve to concrete `(width, height)` for a chart with `max_points`
    /// points in its longest series.
    pub fn dimensions(&self, max_points: usize) -> (u32, u32) {
        match *self {
            FigureSizing::Fixed { width, height } => (width, height),
            FigureSizing::ScaleWithPoints {
                base_width,
                per_point,
                height,
            } => {
                let points = u32::try_from(max_points).unwrap_or(u32::MAX);
                (base_width.max(per_point.saturating_mul(points)), height)
            }
        }
    }
}

/// Everything needed to parse and chart one kind of benchmark output.
#[derive(Debug, Clone)]
pub struct MetricSchema {
    pub kind: BenchmarkKind,
    pub rules: Vec<MarkerRule>,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_scale: AxisScale,
    pub sizing: FigureSizing,
    pub chart_file: String,
    pub footnote: Option<String>,
}

/// Method labels printed by the matrix multiplication benchmark.
pub const DEFAULT_MATRIX_METHODS: &[&str] = &[
    "Basic",
    "Cache Friendly",
    "Strassen",
    "Parallel",
    "Block-wise",
    "Fork-join model in shared-memory",
];

const FIXED_FIGURE: FigureSizing = FigureSizing::Fixed {
    width: 1200,
    height: 800,
};

impl MetricSchema {
    /// Build the schema for `kind`. `methods` is only consulted for
    /// [`BenchmarkKind::Matrix`]; an empty list falls back to
    /// [`DEFAULT_MATRIX_METHODS`].
    pub fn for_kind(kind: BenchmarkKind, methods: &[String]) -> Self {
        match kind {
            BenchmarkKind::Throughput => Self::throughput(),
            BenchmarkKind::Memory => Self::memory(),
            BenchmarkKind::Matrix => {
                if methods.is_empty() {
                    let defaults: Vec<String> =
                        DEFAULT_MATRIX_METHODS.iter().map(|m| m.to_string()).collect();
                    Self::matrix(&defaults)
                } else {
                    Self::matrix(methods)
                }
            }
        }
    }

    pub fn throughput() -> Self {
        Self {
            kind: BenchmarkKind::Throughput,
            rules: vec![
                MarkerRule {
                    marker: "Testing :".to_string(),
                    kind: RowKind::SeriesHeader,
                },
                MarkerRule {
                    marker: "Threads:".to_string(),
                    kind: RowKind::DataRow(ExtractionMode::Positional {
                        x_index: 0,
                        value_index: 1,
                        fraction_index: Some(2),
                        min_tokens: 3,
                    }),
                },
            ],
            title: "Performance Comparison of Concurrent Linked Lists".to_string(),
            x_label: "Number of Threads".to_string(),
            y_label: "Operations per ms (Ops/ms)".to_string(),
            x_scale: AxisScale::Linear,
            sizing: FigureSizing::ScaleWithPoints {
                base_width: 1000,
                per_point: 150,
                height: 800,
            },
            chart_file: "performance_comparison.png".to_string(),
            footnote: None,
        }
    }

    pub fn memory() -> Self {
        Self {
            kind: BenchmarkKind::Memory,
            rules: vec![
                MarkerRule {
                    marker: "Memory Testing:".to_string(),
                    kind: RowKind::SeriesHeader,
                },
                MarkerRule {
                    marker: "Threads:".to_string(),
                    kind: RowKind::DataRow(ExtractionMode::TrailingField { min_tokens: 2 }),
                },
            ],
            title: "Memory Usage Comparison of Concurrent Linked Lists".to_string(),
            x_label: "Number of Threads".to_string(),
            y_label: "Delta Memory Usage (MB)".to_string(),
            x_scale: AxisScale::Log2,
            sizing: FIXED_FIGURE,
            chart_file: "memory_usage_comparison.png".to_string(),
            footnote: None,
        }
    }

    pub fn matrix(methods: &[String]) -> Self {
        let mut rules = vec![MarkerRule {
            marker: "Matrix size:".to_string(),
            kind: RowKind::SizeHeader,
        }];
        rules.extend(methods.iter().map(|method| MarkerRule {
            marker: format!("{method}:"),
            kind: RowKind::Keyed {
                method: method.clone(),
                pattern: KeyedPattern::new(method),
            },
        }));

        Self {
            kind: BenchmarkKind::Matrix,
            rules,
            title: "Matrix Multiplication Methods Performance".to_string(),
            x_label: "Matrix Size (N x N)".to_string(),
            y_label: "Execution Time (ms)".to_string(),
            x_scale: AxisScale::Linear,
            sizing: FIXED_FIGURE,
            chart_file: "matrix_multiplication_performance.png".to_string(),
            footnote: Some(format!("OS:{}", os_name())),
        }
    }

    /// Method labels of the keyed rules, in table order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().filter_map(|rule| match &rule.kind {
            RowKind::Keyed { method, .. } => Some(method.as_str()),
            _ => None,
        })
    }
}

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "macOS",
        "linux" => "Linux",
        other => other,
    }
}
