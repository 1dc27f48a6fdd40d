use crate::parser::OrphanPolicy;
use crate::schema::{BenchmarkKind, MetricSchema};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from benchplot.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub harness: HarnessSection,
    pub build: BuildConfig,
    #[serde(rename = "benchmark")]
    pub benchmarks: Vec<BenchmarkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HarnessSection {
    /// Directory charts, snapshots and transcripts are written to.
    pub output_dir: PathBuf,
    /// Directory the compiler and the benchmark executables run in.
    pub workdir: PathBuf,
    /// Kill the benchmark after this many seconds. Unset means wait forever.
    pub timeout_secs: Option<u64>,
    pub orphan_rows: OrphanPolicy,
    /// Keep the captured stdout next to the chart.
    pub save_transcript: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub command: String,
    /// `{source}` and `{executable}` are substituted per benchmark.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    pub name: String,
    pub kind: BenchmarkKind,
    pub source: PathBuf,
    pub executable: PathBuf,
    /// Replaces `[build].args` for this benchmark.
    #[serde(default)]
    pub build_args: Option<Vec<String>>,
    #[serde(default)]
    pub chart_file: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Method labels for `kind = "matrix"`.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl BenchmarkConfig {
    /// The schema for this benchmark with its overrides applied.
    pub fn schema(&self) -> MetricSchema {
        let mut schema = MetricSchema::for_kind(self.kind, &self.methods);
        if let Some(file) = &self.chart_file {
            schema.chart_file = file.clone();
        }
        if let Some(title) = &self.title {
            schema.title = title.clone();
        }
        schema
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    DuplicateBenchmark(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            ConfigError::DuplicateBenchmark(name) => {
                write!(f, "benchmark {name:?} is defined more than once")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::DuplicateBenchmark(_) => None,
        }
    }
}

impl HarnessConfig {
    /// Load config from `path`. A missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, bench) in self.benchmarks.iter().enumerate() {
            if self.benchmarks[..i].iter().any(|b| b.name == bench.name) {
                return Err(ConfigError::DuplicateBenchmark(bench.name.clone()));
            }
        }
        Ok(())
    }

    pub fn benchmark(&self, name: &str) -> Option<&BenchmarkConfig> {
        self.benchmarks.iter().find(|b| b.name == name)
    }
}

// --- Default implementations ---

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            harness: HarnessSection::default(),
            build: BuildConfig::default(),
            benchmarks: default_benchmarks(),
        }
    }
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("bench_results"),
            workdir: PathBuf::from("."),
            timeout_secs: None,
            orphan_rows: OrphanPolicy::Skip,
            save_transcript: true,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: "g++".to_string(),
            args: vec![
                "-std=c++17".to_string(),
                "-O3".to_string(),
                "-pthread".to_string(),
                "-fopenmp".to_string(),
                "-o".to_string(),
                "{executable}".to_string(),
                "{source}".to_string(),
            ],
        }
    }
}

fn default_benchmarks() -> Vec<BenchmarkConfig> {
    let bench = |name: &str, kind: BenchmarkKind, source: &str, executable: &str| {
        BenchmarkConfig {
            name: name.to_string(),
            kind,
            source: PathBuf::from(source),
            executable: PathBuf::from(executable),
            build_args: None,
            chart_file: None,
            title: None,
            methods: Vec::new(),
        }
    };
    vec![
        bench(
            "performance",
            BenchmarkKind::Throughput,
            "performanceTest.cpp",
            "pT",
        ),
        bench("memory", BenchmarkKind::Memory, "memoryTest.cpp", "memoryTest"),
        bench(
            "matrix",
            BenchmarkKind::Matrix,
            "MatrixMultiply.cpp",
            "MatrixMultiply.out",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AxisScale;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.harness.output_dir, PathBuf::from("bench_results"));
        assert_eq!(config.harness.timeout_secs, None);
        assert_eq!(config.harness.orphan_rows, OrphanPolicy::Skip);
        assert_eq!(config.build.command, "g++");
        let names: Vec<&str> = config.benchmarks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["performance", "memory", "matrix"]);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();
        assert_eq!(config.benchmarks.len(), 3);
        assert!(config.harness.save_transcript);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
[harness]
timeout_secs = 90
orphan_rows = "fail"
"#,
        )
        .unwrap();
        assert_eq!(config.harness.timeout_secs, Some(90));
        assert_eq!(config.harness.orphan_rows, OrphanPolicy::Fail);
        assert_eq!(config.harness.output_dir, PathBuf::from("bench_results"));
        assert_eq!(config.build.args.len(), 7);
    }

    #[test]
    fn test_benchmarks_replace_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
[build]
command = "clang++"
args = ["-O2", "-o", "{executable}", "{source}"]

[[benchmark]]
name = "mm"
kind = "matrix"
source = "mm.cpp"
executable = "mm"
methods = ["Naive", "Tiled"]
chart_file = "mm.png"
title = "Tiling"
build_args = ["-O3", "-fopenmp", "-o", "{executable}", "{source}"]
"#,
        )
        .unwrap();
        assert_eq!(config.build.command, "clang++");
        assert_eq!(config.benchmarks.len(), 1);
        let bench = config.benchmark("mm").unwrap();
        assert_eq!(bench.kind, BenchmarkKind::Matrix);
        let schema = bench.schema();
        assert_eq!(schema.chart_file, "mm.png");
        assert_eq!(schema.title, "Tiling");
        assert_eq!(schema.methods().collect::<Vec<_>>(), vec!["Naive", "Tiled"]);
        assert!(config.benchmark("performance").is_none());
    }

    #[test]
    fn test_memory_benchmark_schema() {
        let config = HarnessConfig::default();
        let schema = config.benchmark("memory").unwrap().schema();
        assert_eq!(schema.x_scale, AxisScale::Log2);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = HarnessConfig::from_toml(
            r#"
[[benchmark]]
name = "x"
kind = "latency"
source = "x.cpp"
executable = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_benchmark_rejected() {
        let err = HarnessConfig::from_toml(
            r#"
[[benchmark]]
name = "a"
kind = "memory"
source = "a.cpp"
executable = "a"

[[benchmark]]
name = "a"
kind = "throughput"
source = "b.cpp"
executable = "b"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"a\""));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.benchmarks.len(), 3);
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[harness\n").unwrap();
        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
