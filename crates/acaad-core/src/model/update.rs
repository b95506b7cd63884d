// ── State changes in both directions ──

use acaad_api::Outcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::metadata::Metadata;

/// Kind of outbound state change requested by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Action,
    Query,
}

/// A coerced outcome value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedValue {
    Boolean(bool),
    Long(i64),
    Decimal(f64),
    String(String),
    Multiple(Vec<ParsedValue>),
}

impl ParsedValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Long(n) => Value::from(*n),
            Self::Decimal(n) => Value::from(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Multiple(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Compare against a reference value from the discovery document
    /// (`onIff`). Numbers compare by value regardless of representation.
    /// Untyped entries parse to `String`, which compares against the
    /// reference's text form.
    pub fn matches(&self, reference: &Value) -> bool {
        match (self, reference) {
            (Self::Boolean(b), Value::Bool(r)) => b == r,
            (Self::Boolean(b), Value::String(r)) => r.trim().eq_ignore_ascii_case(&b.to_string()),
            (Self::Long(_) | Self::Decimal(_), Value::Number(r)) => {
                numbers_equal(self.as_f64(), r.as_f64())
            }
            (Self::Long(_) | Self::Decimal(_), Value::String(r)) => {
                numbers_equal(self.as_f64(), r.trim().parse().ok())
            }
            (Self::String(s), Value::String(r)) => s == r,
            (Self::String(s), Value::Bool(r)) => s.trim().eq_ignore_ascii_case(&r.to_string()),
            (Self::String(s), Value::Number(r)) => {
                numbers_equal(s.trim().parse().ok(), r.as_f64())
            }
            (Self::Multiple(items), Value::Array(refs)) => {
                items.len() == refs.len() && items.iter().zip(refs).all(|(i, r)| i.matches(r))
            }
            _ => false,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(n) => Some(*n as f64),
            Self::Decimal(n) => Some(*n),
            _ => None,
        }
    }
}

fn numbers_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => false,
    }
}

/// Inbound outcome resolved against the component's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundStateUpdate {
    pub original_outcome: Outcome,
    /// Parsed value, or a Boolean for switches (parsed value equals
    /// `onIff`). Absent when the outcome could not be parsed.
    pub determined_target_state: Option<ParsedValue>,
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_match_across_representations() {
        assert!(ParsedValue::Long(1).matches(&json!(1.0)));
        assert!(ParsedValue::Decimal(21.5).matches(&json!(21.5)));
        assert!(!ParsedValue::Long(0).matches(&json!(1)));
    }

    #[test]
    fn booleans_match_json_and_text() {
        assert!(ParsedValue::Boolean(true).matches(&json!(true)));
        assert!(ParsedValue::Boolean(true).matches(&json!("True")));
        assert!(!ParsedValue::Boolean(false).matches(&json!(true)));
        assert!(!ParsedValue::String("on".into()).matches(&json!(true)));
    }

    #[test]
    fn untyped_strings_match_non_string_references() {
        assert!(ParsedValue::String("true".into()).matches(&json!(true)));
        assert!(ParsedValue::String("False".into()).matches(&json!(false)));
        assert!(!ParsedValue::String("false".into()).matches(&json!(true)));
        assert!(ParsedValue::String("1".into()).matches(&json!(1)));
        assert!(!ParsedValue::String("2".into()).matches(&json!(1)));
        assert!(ParsedValue::Long(1).matches(&json!("1")));
    }

    #[test]
    fn serializes_untagged() {
        let value = ParsedValue::Multiple(vec![ParsedValue::Long(1337), ParsedValue::Boolean(false)]);
        assert_eq!(value.to_json(), json!([1337, false]));
        assert_eq!(serde_json::to_value(&value).ok(), Some(json!([1337, false])));
    }
}
