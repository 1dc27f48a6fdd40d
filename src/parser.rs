/// Single parsing pass over benchmark stdout.
///
/// Parsing context (active series, current shared x) lives in an explicit
/// [`ParserState`] threaded through every line. Row-level problems never
/// abort the pass; an orphan row aborts only under [`OrphanPolicy::Fail`].
use crate::classify::{classify, LineClass};
use crate::extract::{self, Malformed};
use crate::schema::MetricSchema;
use crate::store::{MetricsStore, Sample};
use serde::Deserialize;

/// What to do with a data row seen before any header set a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Drop the row with a warning.
    #[default]
    Skip,
    /// Abort parsing with [`ParseError::OrphanDataRow`].
    Fail,
}

/// Context carried from one line to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserState {
    /// Label of the series opened by the last header.
    pub active_series: Option<String>,
    /// Shared x value from the last size header.
    pub current_x: Option<u64>,
}

/// Counters describing one parsing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub lines: usize,
    pub headers: usize,
    pub samples: usize,
    pub malformed: usize,
    pub orphans: usize,
}

/// Errors that abort a parsing pass.
#[derive(Debug)]
pub enum ParseError {
    /// A data row arrived with no active series or size context.
    OrphanDataRow { line_no: usize, line: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::OrphanDataRow { line_no, line } => {
                write!(f, "line {line_no}: data row before any header: {line:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Incremental parser feeding one [`MetricsStore`].
pub struct Parser<'s> {
    schema: &'s MetricSchema,
    policy: OrphanPolicy,
    state: ParserState,
    store: MetricsStore,
    report: ParseReport,
}

impl<'s> Parser<'s> {
    pub fn new(schema: &'s MetricSchema, policy: OrphanPolicy) -> Self {
        let mut store = MetricsStore::new();
        // Keyed methods form a closed set; their lines exist even before the
        // first result so chart order follows the schema.
        for method in schema.methods() {
            store.ensure_series(method);
        }
        Self {
            schema,
            policy,
            state: ParserState::default(),
            store,
            report: ParseReport::default(),
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    #[allow(dead_code)]
    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Classify and apply one line.
    pub fn feed_line(&mut self, line: &str) -> Result<(), ParseError> {
        self.report.lines += 1;
        let line_no = self.report.lines;
        let schema = self.schema;

        match classify(line, schema) {
            LineClass::Irrelevant => {}
            LineClass::SeriesHeader(label) => {
                tracing::debug!(line_no, series = %label, "series header");
                self.store.begin_series(&label);
                self.state.active_series = Some(label);
                self.report.headers += 1;
            }
            LineClass::SizeHeader(Some(x)) => {
                tracing::debug!(line_no, x, "size header");
                self.store.record_shared_x(x);
                self.state.current_x = Some(x);
                self.report.headers += 1;
            }
            LineClass::SizeHeader(None) => {
                // Rows after an unreadable size must not inherit the previous one.
                self.state.current_x = None;
                self.malformed(line_no, line, &Malformed::BadNumber(line.to_string()));
            }
            LineClass::DataRow { raw, mode } => {
                let Some(label) = self.state.active_series.clone() else {
                    return self.orphan(line_no, raw);
                };
                match extract::extract_row(raw, mode) {
                    Ok((x, value)) => self.record(&label, x, value),
                    Err(reason) => self.malformed(line_no, raw, &reason),
                }
            }
            LineClass::KeyedRow {
                method,
                pattern,
                raw,
            } => {
                let Some(x) = self.state.current_x else {
                    return self.orphan(line_no, raw);
                };
                match extract::extract_keyed(raw, pattern) {
                    Ok(value) => self.record(method, x, value),
                    Err(reason) => self.malformed(line_no, raw, &reason),
                }
            }
        }
        Ok(())
    }

    /// Feed every line of `text`, in order.
    pub fn feed_text(&mut self, text: &str) -> Result<(), ParseError> {
        for line in text.lines() {
            self.feed_line(line)?;
        }
        Ok(())
    }

    pub fn finish(self) -> (MetricsStore, ParseReport) {
        tracing::info!(
            lines = self.report.lines,
            headers = self.report.headers,
            series = self.store.series().len(),
            samples = self.report.samples,
            malformed = self.report.malformed,
            orphans = self.report.orphans,
            "parsed benchmark output"
        );
        (self.store, self.report)
    }

    fn record(&mut self, label: &str, x: u64, value: f64) {
        self.store.push(label, Sample { x, value });
        self.report.samples += 1;
    }

    fn malformed(&mut self, line_no: usize, line: &str, reason: &Malformed) {
        tracing::debug!(line_no, line, %reason, "skipping malformed row");
        self.report.malformed += 1;
    }

    fn orphan(&mut self, line_no: usize, line: &str) -> Result<(), ParseError> {
        self.report.orphans += 1;
        match self.policy {
            OrphanPolicy::Skip => {
                tracing::warn!(line_no, line, "data row before any header, skipping");
                Ok(())
            }
            OrphanPolicy::Fail => Err(ParseError::OrphanDataRow {
                line_no,
                line: line.to_string(),
            }),
        }
    }
}

/// Parse a complete transcript in one call.
pub fn parse_transcript(
    schema: &MetricSchema,
    policy: OrphanPolicy,
    text: &str,
) -> Result<(MetricsStore, ParseReport), ParseError> {
    let mut parser = Parser::new(schema, policy);
    parser.feed_text(text)?;
    Ok(parser.finish())
}
