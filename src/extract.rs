/// Numeric extraction from classified rows.
///
/// Numeric tokens are runs of ASCII digits; a value printed as `12.345`
/// shows up as the two tokens `12` and `345`. Rows with too few tokens or an
/// unparsable value are reported as malformed and skipped by the caller.
use crate::schema::{ExtractionMode, KeyedPattern};
use regex::Regex;
use std::sync::LazyLock;

static NUMERIC_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static MATRIX_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*[xX]\s*\d+").unwrap());

/// Why a row produced no sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Malformed {
    /// Fewer numeric tokens than the extraction mode needs.
    TooFewTokens { found: usize, required: usize },
    /// A token or field could not be converted to a number.
    BadNumber(String),
    /// A keyed row whose value did not follow the method label.
    MissingValue,
}

impl std::fmt::Display for Malformed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Malformed::TooFewTokens { found, required } => {
                write!(f, "expected at least {required} numeric tokens, found {found}")
            }
            Malformed::BadNumber(text) => write!(f, "not a number: {text:?}"),
            Malformed::MissingValue => write!(f, "no value after method label"),
        }
    }
}

/// All digit runs in `line`, in order.
pub fn numeric_tokens(line: &str) -> Vec<&str> {
    NUMERIC_TOKEN.find_iter(line).map(|m| m.as_str()).collect()
}

/// Extract `(x, value)` from a data row using `mode`.
pub fn extract_row(line: &str, mode: &ExtractionMode) -> Result<(u64, f64), Malformed> {
    let tokens = numeric_tokens(line);
    match *mode {
        ExtractionMode::Positional {
            x_index,
            value_index,
            fraction_index,
            min_tokens,
        } => {
            let required = min_tokens
                .max(x_index + 1)
                .max(value_index + 1)
                .max(fraction_index.map_or(0, |i| i + 1));
            if tokens.len() < required {
                return Err(Malformed::TooFewTokens {
                    found: tokens.len(),
                    required,
                });
            }
            let x = parse_x(tokens[x_index])?;
            let text = match fraction_index {
                Some(i) => format!("{}.{}", tokens[value_index], tokens[i]),
                None => tokens[value_index].to_string(),
            };
            let value = parse_value(&text)?;
            Ok((x, value))
        }
        ExtractionMode::TrailingField { min_tokens } => {
            let required = min_tokens.max(1);
            if tokens.len() < required {
                return Err(Malformed::TooFewTokens {
                    found: tokens.len(),
                    required,
                });
            }
            let x = parse_x(tokens[0])?;
            let value = trailing_field(line)?;
            Ok((x, value))
        }
    }
}

/// Value of a keyed row, e.g. `120` from `Basic: 120 ms`.
pub fn extract_keyed(line: &str, pattern: &KeyedPattern) -> Result<f64, Malformed> {
    let text = pattern.value(line).ok_or(Malformed::MissingValue)?;
    parse_value(text)
}

/// `N` from the remainder of a `Matrix size: NxN` line.
///
/// Falls back to the first numeric token when the `NxN` form is absent.
pub fn matrix_size(rest: &str) -> Option<u64> {
    let text = match MATRIX_SIZE.captures(rest) {
        Some(caps) => caps.get(1)?.as_str(),
        None => NUMERIC_TOKEN.find(rest)?.as_str(),
    };
    text.parse().ok()
}

fn parse_x(token: &str) -> Result<u64, Malformed> {
    token
        .parse::<u64>()
        .map_err(|_| Malformed::BadNumber(token.to_string()))
}

/// The last colon-delimited field with its trailing unit token dropped:
/// `"..., Delta Memory: 3.2 MB"` gives `3.2`.
fn trailing_field(line: &str) -> Result<f64, Malformed> {
    let field = line.rsplit(':').next().unwrap_or("").trim();
    let number = field.split_whitespace().next().unwrap_or("");
    parse_value(number)
}

/// Parse a metric value. `inf` and `NaN` are rejected: they cannot be
/// charted or stored in the JSON snapshot.
fn parse_value(text: &str) -> Result<f64, Malformed> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Malformed::BadNumber(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetricSchema;
    use crate::schema::RowKind;

    fn mode_of(schema: &MetricSchema) -> ExtractionMode {
        schema
            .rules
            .iter()
            .find_map(|r| match &r.kind {
                RowKind::DataRow(mode) => Some(mode.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_numeric_tokens() {
        assert_eq!(
            numeric_tokens("Threads: 4, Ops/ms: 12.345"),
            vec!["4", "12", "345"]
        );
        assert!(numeric_tokens("no digits here").is_empty());
    }

    #[test]
    fn test_positional_reassembles_fraction() {
        let mode = mode_of(&MetricSchema::throughput());
        assert_eq!(
            extract_row("Threads: 4, Ops/ms: 12.345", &mode),
            Ok((4, 12.345))
        );
    }

    #[test]
    fn test_positional_keeps_leading_zeros_in_fraction() {
        let mode = mode_of(&MetricSchema::throughput());
        assert_eq!(
            extract_row("Threads: 16, Ops/ms: 7.05", &mode),
            Ok((16, 7.05))
        );
    }

    #[test]
    fn test_positional_underflow() {
        let mode = mode_of(&MetricSchema::throughput());
        assert_eq!(
            extract_row("Threads: 4, Ops/ms: 12", &mode),
            Err(Malformed::TooFewTokens {
                found: 2,
                required: 3
            })
        );
    }

    #[test]
    fn test_positional_without_fraction() {
        let mode = ExtractionMode::Positional {
            x_index: 1,
            value_index: 0,
            fraction_index: None,
            min_tokens: 2,
        };
        assert_eq!(extract_row("took 250 ms at size 64", &mode), Ok((64, 250.0)));
    }

    #[test]
    fn test_trailing_field_strips_unit() {
        let mode = mode_of(&MetricSchema::memory());
        assert_eq!(
            extract_row(
                "Threads: 8, Before: 10.0 MB, After: 13.2 MB, Delta Memory: 3.2 MB",
                &mode
            ),
            Ok((8, 3.2))
        );
    }

    #[test]
    fn test_trailing_field_negative_delta() {
        let mode = mode_of(&MetricSchema::memory());
        assert_eq!(
            extract_row("Threads: 2, Delta Memory: -0.5 MB", &mode),
            Ok((2, -0.5))
        );
    }

    #[test]
    fn test_trailing_field_underflow() {
        let mode = mode_of(&MetricSchema::memory());
        assert_eq!(
            extract_row("Threads: 8, Delta Memory: n/a", &mode),
            Err(Malformed::TooFewTokens {
                found: 1,
                required: 2
            })
        );
    }

    #[test]
    fn test_trailing_field_not_a_number() {
        let mode = mode_of(&MetricSchema::memory());
        assert_eq!(
            extract_row("Threads: 8, Run 2, Delta Memory: pending", &mode),
            Err(Malformed::BadNumber("pending".to_string()))
        );
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mode = mode_of(&MetricSchema::memory());
        for word in ["inf", "NaN", "-infinity"] {
            let line = format!("Threads: 2, Run 1, Delta Memory: {word} MB");
            assert_eq!(
                extract_row(&line, &mode),
                Err(Malformed::BadNumber(word.to_string()))
            );
        }

        let positional = mode_of(&MetricSchema::throughput());
        let huge = format!("Threads: 1, Ops/ms: {}.5", "9".repeat(400));
        assert!(matches!(
            extract_row(&huge, &positional),
            Err(Malformed::BadNumber(_))
        ));
    }

    #[test]
    fn test_keyed_value() {
        let pattern = KeyedPattern::new("Basic");
        assert_eq!(extract_keyed("Basic: 120 ms", &pattern), Ok(120.0));
        assert_eq!(
            extract_keyed("Basic: ms", &pattern),
            Err(Malformed::MissingValue)
        );
    }

    #[test]
    fn test_matrix_size() {
        assert_eq!(matrix_size(" 256x256"), Some(256));
        assert_eq!(matrix_size(" 1024 x 1024"), Some(1024));
        assert_eq!(matrix_size(" 64"), Some(64));
        assert_eq!(matrix_size(" unknown"), None);
    }

    #[test]
    fn test_malformed_display() {
        let err = Malformed::TooFewTokens {
            found: 1,
            required: 3,
        };
        assert_eq!(err.to_string(), "expected at least 3 numeric tokens, found 1");
    }
}
