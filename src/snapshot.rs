/// Metrics snapshot: the parsed store written as JSON next to the chart.
///
/// Uses atomic write pattern: write to temp file then rename.
use crate::schema::{BenchmarkKind, MetricSchema};
use crate::store::{MetricsStore, Series};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The JSON payload written to `<chart stem>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub benchmark: String,
    pub kind: BenchmarkKind,
    pub generated_at: DateTime<Utc>,
    pub x_label: String,
    pub y_label: String,
    /// Shared x domain of keyed benchmarks; empty otherwise.
    #[serde(default)]
    pub shared_x: Vec<u64>,
    pub series: Vec<Series>,
}

#[derive(Debug)]
pub enum SnapshotError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize {
        source: serde_json::Error,
    },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io { path, source } => {
                write!(f, "snapshot I/O error at {}: {}", path.display(), source)
            }
            SnapshotError::Serialize { source } => {
                write!(f, "failed to (de)serialize snapshot: {source}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            SnapshotError::Serialize { source } => Some(source),
        }
    }
}

impl Snapshot {
    pub fn new(benchmark: &str, schema: &MetricSchema, store: &MetricsStore) -> Self {
        Self {
            benchmark: benchmark.to_string(),
            kind: schema.kind,
            generated_at: Utc::now(),
            x_label: schema.x_label.clone(),
            y_label: schema.y_label.clone(),
            shared_x: store.shared_x().to_vec(),
            series: store.series().to_vec(),
        }
    }

    /// Rebuild the store the snapshot was taken from.
    pub fn to_store(&self) -> MetricsStore {
        let mut store = MetricsStore::new();
        for x in &self.shared_x {
            store.record_shared_x(*x);
        }
        for series in &self.series {
            store.begin_series(&series.label);
            for sample in &series.samples {
                store.push(&series.label, *sample);
            }
        }
        store
    }
}

/// `performance_comparison.png` → `<dir>/performance_comparison.json`.
pub fn snapshot_path(output_dir: &Path, chart_file: &str) -> PathBuf {
    output_dir.join(chart_file).with_extension("json")
}

/// Atomically write the snapshot to `path`.
///
/// Writes to a temporary file in the same directory, then renames
/// so readers never see a partial write.
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| SnapshotError::Serialize { source: e })?;

    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| SnapshotError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let tmp_path = dir.join(format!(".snapshot.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json).map_err(|e| SnapshotError::Io {
        path: tmp_path.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        SnapshotError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    Ok(())
}

pub fn read(path: &Path) -> Result<Snapshot, SnapshotError> {
    let contents = std::fs::read_to_string(path).map_err(|e| SnapshotError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| SnapshotError::Serialize { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_transcript, OrphanPolicy};

    const TRANSCRIPT: &str = "\
Memory Testing: LockFreeList
Threads: 1, Delta Memory: 0.1 MB
Threads: 2, Delta Memory: 0.30000000000000004 MB
Threads: 8, Delta Memory: 3.2 MB
Memory Testing: NaiveList
Threads: 4, Delta Memory: -1.75 MB
";

    #[test]
    fn test_snapshot_path_swaps_extension() {
        assert_eq!(
            snapshot_path(Path::new("out"), "memory_usage_comparison.png"),
            PathBuf::from("out/memory_usage_comparison.json")
        );
    }

    #[test]
    fn test_round_trip_reproduces_transcript_values() {
        let dir = tempfile::tempdir().unwrap();
        let schema = MetricSchema::memory();
        let (store, _) = parse_transcript(&schema, OrphanPolicy::Skip, TRANSCRIPT).unwrap();

        let path = snapshot_path(dir.path(), &schema.chart_file);
        write(&path, &Snapshot::new("memory", &schema, &store)).unwrap();
        let restored = read(&path).unwrap().to_store();
        assert_eq!(restored, store);

        // Every value printed in the transcript comes back bit-for-bit.
        let printed: Vec<u64> = TRANSCRIPT
            .lines()
            .filter_map(|l| l.rsplit(':').next()?.split_whitespace().next()?.parse::<f64>().ok())
            .map(f64::to_bits)
            .collect();
        let stored: Vec<u64> = restored
            .series()
            .iter()
            .flat_map(|s| s.samples.iter().map(|sample| sample.value.to_bits()))
            .collect();
        assert_eq!(stored, printed);
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let schema = MetricSchema::throughput();
        let store = MetricsStore::new();
        let path = dir.path().join("nested").join("perf.json");
        write(&path, &Snapshot::new("perf", &schema, &store)).unwrap();

        let entries: Vec<String> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["perf.json"]);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let schema = MetricSchema::for_kind(BenchmarkKind::Matrix, &["Basic".to_string()]);
        let (store, _) = parse_transcript(
            &schema,
            OrphanPolicy::Skip,
            "Matrix size: 64x64\nBasic: 3 ms\n",
        )
        .unwrap();
        let json = serde_json::to_value(Snapshot::new("matrix", &schema, &store)).unwrap();
        assert_eq!(json["kind"], "matrix");
        assert_eq!(json["shared_x"], serde_json::json!([64]));
        assert_eq!(json["series"][0]["label"], "Basic");
        assert_eq!(json["series"][0]["samples"][0]["x"], 64);
        assert_eq!(json["series"][0]["samples"][0]["value"], 3.0);
    }

    #[test]
    fn test_non_finite_rows_do_not_break_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let schema = MetricSchema::memory();
        let text = "Memory Testing: A\n\
                    Threads: 2, Run 1, Delta Memory: inf MB\n\
                    Threads: 4, Run 1, Delta Memory: 1.5 MB\n";
        let (store, report) = parse_transcript(&schema, OrphanPolicy::Skip, text).unwrap();
        assert_eq!(report.malformed, 1);

        let path = snapshot_path(dir.path(), &schema.chart_file);
        write(&path, &Snapshot::new("memory", &schema, &store)).unwrap();
        assert_eq!(read(&path).unwrap().to_store(), store);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read(Path::new("/nonexistent/snapshot.json")).unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
