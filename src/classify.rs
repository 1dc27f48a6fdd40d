/// Line classification: decide what one line of benchmark stdout is.
///
/// The schema's marker table is scanned in order and the first marker found
/// as a substring of the line decides the class. Lines matching no marker
/// are irrelevant (banners, blank lines, diagnostics).
use crate::extract;
use crate::schema::{ExtractionMode, KeyedPattern, MetricSchema, RowKind};

/// The class of a single line of output.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClass<'a> {
    /// Starts (or restarts) the series with this label.
    SeriesHeader(String),
    /// A `Matrix size: NxN` line carrying the shared x value.
    SizeHeader(Option<u64>),
    /// A sample row for the active series.
    DataRow {
        raw: &'a str,
        mode: &'a ExtractionMode,
    },
    /// One method's result for the current shared x value.
    KeyedRow {
        method: &'a str,
        pattern: &'a KeyedPattern,
        raw: &'a str,
    },
    Irrelevant,
}

/// Classify `line` against the schema's marker table.
pub fn classify<'a>(line: &'a str, schema: &'a MetricSchema) -> LineClass<'a> {
    for rule in &schema.rules {
        let Some(pos) = line.find(&rule.marker) else {
            continue;
        };
        // A method label that only appears as the tail of a longer label
        // (`Parallel:` inside `Semi-Parallel:`) belongs to a later rule.
        if matches!(rule.kind, RowKind::Keyed { .. }) && !starts_label(line, &rule.marker) {
            continue;
        }
        return match &rule.kind {
            RowKind::SeriesHeader => {
                let label = header_label(&line[pos + rule.marker.len()..]);
                if label.is_empty() {
                    tracing::warn!(line, "series header without a label, ignoring");
                    LineClass::Irrelevant
                } else {
                    LineClass::SeriesHeader(label.to_string())
                }
            }
            RowKind::SizeHeader => {
                LineClass::SizeHeader(extract::matrix_size(&line[pos + rule.marker.len()..]))
            }
            RowKind::DataRow(mode) => LineClass::DataRow { raw: line, mode },
            RowKind::Keyed { method, pattern } => LineClass::KeyedRow {
                method,
                pattern,
                raw: line,
            },
        };
    }
    LineClass::Irrelevant
}

/// Whether `marker` occurs in `line` not preceded by a word character or `-`.
fn starts_label(line: &str, marker: &str) -> bool {
    line.match_indices(marker).any(|(pos, _)| {
        line[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '-'))
    })
}

/// The label is the first colon-delimited field after the marker.
fn header_label(rest: &str) -> &str {
    rest.split(':').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_header() {
        let schema = MetricSchema::throughput();
        assert_eq!(
            classify("Testing : SkipList", &schema),
            LineClass::SeriesHeader("SkipList".to_string())
        );
    }

    #[test]
    fn test_header_label_is_trimmed() {
        let schema = MetricSchema::memory();
        assert_eq!(
            classify("== Memory Testing:   LockFreeList   ", &schema),
            LineClass::SeriesHeader("LockFreeList".to_string())
        );
    }

    #[test]
    fn test_header_label_stops_at_next_colon() {
        let schema = MetricSchema::throughput();
        assert_eq!(
            classify("Testing : FineGrained: v2", &schema),
            LineClass::SeriesHeader("FineGrained".to_string())
        );
    }

    #[test]
    fn test_empty_header_label_is_irrelevant() {
        let schema = MetricSchema::throughput();
        assert_eq!(classify("Testing :   ", &schema), LineClass::Irrelevant);
    }

    #[test]
    fn test_data_row_carries_mode() {
        let schema = MetricSchema::throughput();
        match classify("Threads: 4, Ops/ms: 12.345", &schema) {
            LineClass::DataRow { raw, mode } => {
                assert_eq!(raw, "Threads: 4, Ops/ms: 12.345");
                assert!(matches!(mode, ExtractionMode::Positional { .. }));
            }
            other => panic!("expected data row, got {other:?}"),
        }
    }

    #[test]
    fn test_memory_header_not_confused_with_throughput_marker() {
        // "Testing :" (with a space) must not match "Memory Testing:".
        let schema = MetricSchema::throughput();
        assert_eq!(
            classify("Memory Testing: LockFreeList", &schema),
            LineClass::Irrelevant
        );
    }

    #[test]
    fn test_size_header() {
        let schema = MetricSchema::for_kind(crate::schema::BenchmarkKind::Matrix, &[]);
        assert_eq!(
            classify("Matrix size: 256x256", &schema),
            LineClass::SizeHeader(Some(256))
        );
    }

    #[test]
    fn test_keyed_row() {
        let schema = MetricSchema::for_kind(crate::schema::BenchmarkKind::Matrix, &[]);
        match classify("Strassen: 45 ms", &schema) {
            LineClass::KeyedRow { method, raw, .. } => {
                assert_eq!(method, "Strassen");
                assert_eq!(raw, "Strassen: 45 ms");
            }
            other => panic!("expected keyed row, got {other:?}"),
        }
    }

    #[test]
    fn test_keyed_label_ending_in_another_label() {
        let methods = vec!["Parallel".to_string(), "Semi-Parallel".to_string()];
        let schema = MetricSchema::for_kind(crate::schema::BenchmarkKind::Matrix, &methods);
        match classify("Semi-Parallel: 40 ms", &schema) {
            LineClass::KeyedRow { method, .. } => assert_eq!(method, "Semi-Parallel"),
            other => panic!("expected keyed row, got {other:?}"),
        }
        match classify("  Parallel: 12 ms", &schema) {
            LineClass::KeyedRow { method, .. } => assert_eq!(method, "Parallel"),
            other => panic!("expected keyed row, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_method_is_irrelevant() {
        let schema = MetricSchema::for_kind(crate::schema::BenchmarkKind::Matrix, &[]);
        assert_eq!(classify("Winograd: 30 ms", &schema), LineClass::Irrelevant);
    }

    #[test]
    fn test_irrelevant_lines() {
        let schema = MetricSchema::throughput();
        for line in ["", "=====", "Starting benchmark", "ops completed"] {
            assert_eq!(classify(line, &schema), LineClass::Irrelevant);
        }
    }

    #[test]
    fn test_first_match_wins() {
        // A line carrying both markers is classified by the earlier rule.
        let schema = MetricSchema::throughput();
        assert_eq!(
            classify("Testing : Threads: 8", &schema),
            LineClass::SeriesHeader("Threads".to_string())
        );
    }
}
