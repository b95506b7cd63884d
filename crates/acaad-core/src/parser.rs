// ── Outcome parser ──
//
// Type- and cardinality-directed coercion of raw push payloads. Single
// values are strict; arrays are lenient and drop elements that fail to
// coerce.

use acaad_api::{Cardinality, Outcome, ResultType};
use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Metadata, ParsedValue};

/// Parse `outcome.outcome_raw` according to the metadata's result type
/// and cardinality.
pub fn parse_outcome(metadata: &Metadata, outcome: &Outcome) -> Result<ParsedValue, CoreError> {
    let raw = outcome
        .outcome_raw
        .as_deref()
        .ok_or_else(|| CoreError::not_parseable("outcome carries no raw value"))?;

    match &metadata.cardinality {
        Cardinality::Single => {
            // Bare tokens like `tRUe` or `hello` are not JSON; take them as
            // JSON strings.
            let value = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.to_owned()));
            coerce(&metadata.result_type, &value)
        }
        Cardinality::Multiple => {
            ensure_known(&metadata.result_type)?;

            let value: Value = serde_json::from_str(raw).map_err(|e| CoreError::OutcomeNotJson {
                message: format!("{e}: {raw}"),
            })?;
            let Value::Array(items) = value else {
                return Err(CoreError::not_parseable(format!(
                    "expected a JSON array for cardinality Multiple, got {raw}"
                )));
            };

            let parsed = items
                .iter()
                .filter_map(|item| match coerce(&metadata.result_type, item) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        debug!(error = %e, "Skipping array element");
                        None
                    }
                })
                .collect();
            Ok(ParsedValue::Multiple(parsed))
        }
        Cardinality::Unknown(other) => Err(CoreError::VersionMismatch {
            message: format!("unknown cardinality '{other}'"),
        }),
    }
}

fn ensure_known(result_type: &ResultType) -> Result<(), CoreError> {
    match result_type {
        ResultType::Unknown(other) => Err(CoreError::VersionMismatch {
            message: format!("unknown result type '{other}'"),
        }),
        _ => Ok(()),
    }
}

/// Coerce a single JSON value.
fn coerce(result_type: &ResultType, value: &Value) -> Result<ParsedValue, CoreError> {
    match result_type {
        ResultType::String => Ok(ParsedValue::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ResultType::Boolean => match value {
            Value::Bool(b) => Ok(ParsedValue::Boolean(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(ParsedValue::Boolean(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(ParsedValue::Boolean(false)),
            other => Err(CoreError::not_parseable(format!("{other} is not a boolean"))),
        },
        ResultType::Long => to_f64(value).and_then(round_to_i64).map(ParsedValue::Long),
        ResultType::Decimal => to_f64(value).map(ParsedValue::Decimal),
        ResultType::Unknown(other) => Err(CoreError::VersionMismatch {
            message: format!("unknown result type '{other}'"),
        }),
    }
}

fn to_f64(value: &Value) -> Result<f64, CoreError> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    n.filter(|n| n.is_finite())
        .ok_or_else(|| CoreError::not_parseable(format!("{value} is not a number")))
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn round_to_i64(n: f64) -> Result<i64, CoreError> {
    let rounded = n.round();
    // i64::MAX is not exactly representable; the upper bound is exclusive.
    if rounded >= -(2f64.powi(63)) && rounded < 2f64.powi(63) {
        Ok(rounded as i64)
    } else {
        Err(CoreError::not_parseable(format!("{n} is out of range for Long")))
    }
}

#[cfg(test)]
mod tests {
    use acaad_api::{ComponentRef, OperationMethod};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn metadata(result_type: ResultType, cardinality: Cardinality) -> Metadata {
        Metadata {
            path: "/x".into(),
            method: OperationMethod::Get,
            component: ComponentRef {
                component_type: "Sensor".into(),
                name: "x".into(),
            },
            actionable: false,
            queryable: true,
            idempotent: false,
            result_type,
            cardinality,
            for_value: None,
            on_iff: None,
            unit_of_measure: None,
        }
    }

    fn outcome(raw: &str) -> Outcome {
        Outcome {
            success: true,
            outcome_raw: Some(raw.to_owned()),
        }
    }

    fn single(result_type: ResultType, raw: &str) -> Result<ParsedValue, CoreError> {
        parse_outcome(&metadata(result_type, Cardinality::Single), &outcome(raw))
    }

    fn kind(result: Result<ParsedValue, CoreError>) -> Option<ErrorKind> {
        result.err().map(|e| e.kind())
    }

    #[test]
    fn missing_raw_is_not_parseable() {
        let result = parse_outcome(
            &metadata(ResultType::String, Cardinality::Single),
            &Outcome {
                success: true,
                outcome_raw: None,
            },
        );
        assert_eq!(kind(result), Some(ErrorKind::OutcomeNotParseable));
    }

    #[test]
    fn boolean_is_case_insensitive() {
        assert_eq!(single(ResultType::Boolean, "tRUe").ok(), Some(ParsedValue::Boolean(true)));
        assert_eq!(single(ResultType::Boolean, "\"FALSE\"").ok(), Some(ParsedValue::Boolean(false)));
        assert_eq!(single(ResultType::Boolean, "true").ok(), Some(ParsedValue::Boolean(true)));
    }

    #[test]
    fn boolean_rejects_other_literals() {
        assert_eq!(kind(single(ResultType::Boolean, "yes")), Some(ErrorKind::OutcomeNotParseable));
        assert_eq!(kind(single(ResultType::Boolean, "1")), Some(ErrorKind::OutcomeNotParseable));
    }

    #[test]
    fn long_rounds_to_nearest() {
        assert_eq!(single(ResultType::Long, "41.6").ok(), Some(ParsedValue::Long(42)));
        assert_eq!(single(ResultType::Long, "\"7\"").ok(), Some(ParsedValue::Long(7)));
        assert_eq!(single(ResultType::Long, "-2.5").ok(), Some(ParsedValue::Long(-3)));
    }

    #[test]
    fn long_fails_on_non_numeric_input() {
        assert_eq!(
            kind(single(ResultType::Long, "not-a-number")),
            Some(ErrorKind::OutcomeNotParseable)
        );
    }

    #[test]
    fn decimal_and_string() {
        assert_eq!(single(ResultType::Decimal, "21.5").ok(), Some(ParsedValue::Decimal(21.5)));
        assert_eq!(
            single(ResultType::String, "hello world").ok(),
            Some(ParsedValue::String("hello world".into()))
        );
        assert_eq!(single(ResultType::String, "42").ok(), Some(ParsedValue::String("42".into())));
    }

    #[test]
    fn multiple_skips_bad_elements() {
        let result = parse_outcome(
            &metadata(ResultType::Long, Cardinality::Multiple),
            &outcome("[1337,\"x\"]"),
        );
        assert_eq!(result.ok(), Some(ParsedValue::Multiple(vec![ParsedValue::Long(1337)])));
    }

    #[test]
    fn multiple_requires_json_array() {
        let md = metadata(ResultType::Long, Cardinality::Multiple);
        assert_eq!(
            kind(parse_outcome(&md, &outcome("[1,"))),
            Some(ErrorKind::OutcomeNotJson)
        );
        assert_eq!(
            kind(parse_outcome(&md, &outcome("{\"a\":1}"))),
            Some(ErrorKind::OutcomeNotParseable)
        );
    }

    #[test]
    fn unknown_type_or_cardinality_is_version_mismatch() {
        assert_eq!(
            kind(single(ResultType::Unknown("Float128".into()), "1")),
            Some(ErrorKind::VersionMismatch)
        );
        assert_eq!(
            kind(parse_outcome(
                &metadata(ResultType::Unknown("Float128".into()), Cardinality::Multiple),
                &outcome("[1]"),
            )),
            Some(ErrorKind::VersionMismatch)
        );
        assert_eq!(
            kind(parse_outcome(
                &metadata(ResultType::Long, Cardinality::Unknown("Many".into())),
                &outcome("1"),
            )),
            Some(ErrorKind::VersionMismatch)
        );
    }
}
