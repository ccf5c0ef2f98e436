use serde_json::{Map, Value};

use crate::log_fetcher::ResultRow;

/// Row pointer field; useless outside the console, so it never reaches output.
pub const POINTER_FIELD: &str = "@ptr";
pub const MESSAGE_FIELD: &str = "@message";

pub type FlatRecord = Map<String, Value>;

pub fn flatten(rows: &[ResultRow]) -> Vec<FlatRecord> {
    rows.iter().map(flatten_row).collect()
}

pub fn flatten_row(row: &ResultRow) -> FlatRecord {
    let mut record = FlatRecord::new();
    for entry in row {
        match entry.field.as_str() {
            POINTER_FIELD => continue,
            MESSAGE_FIELD => {
                record.insert(entry.field.clone(), parse_message(&entry.value));
            }
            _ => {
                record.insert(entry.field.clone(), Value::String(entry.value.clone()));
            }
        }
    }
    record
}

/// Objects and arrays are kept as structure; anything else, including bare
/// JSON scalars, stays the original text.
fn parse_message(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_fetcher::ResultField;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn row(fields: &[(&str, &str)]) -> ResultRow {
        fields
            .iter()
            .map(|(name, value)| ResultField::new(*name, *value))
            .collect()
    }

    #[test]
    fn pointer_field_is_dropped() {
        let rows = vec![
            row(&[("@timestamp", "t1"), ("@ptr", "abc")]),
            row(&[("@ptr", "def")]),
        ];
        for record in flatten(&rows) {
            assert!(!record.contains_key(POINTER_FIELD));
        }
    }

    #[test]
    fn message_json_becomes_structure() {
        let rows = vec![row(&[("@message", r#"{"level":"info","n":3}"#)])];
        let records = flatten(&rows);
        assert_eq!(records[0]["@message"], json!({"level": "info", "n": 3}));
    }

    #[rstest]
    #[case::plain_text("GET /health 200")]
    #[case::truncated_json(r#"{"level":"info""#)]
    #[case::bare_number("42")]
    #[case::empty("")]
    fn unparseable_message_is_kept_verbatim(#[case] raw: &str) {
        let records = flatten(&[row(&[("@message", raw)])]);
        assert_eq!(records[0]["@message"], Value::String(raw.to_string()));
    }

    #[test]
    fn other_fields_are_verbatim_strings() {
        let records = flatten(&[row(&[("count", "{\"a\":1}"), ("@logStream", "s1")])]);
        assert_eq!(records[0]["count"], json!("{\"a\":1}"));
        assert_eq!(records[0]["@logStream"], json!("s1"));
    }

    #[test]
    fn one_record_per_row_in_order_with_mixed_schemas() {
        let rows = vec![
            row(&[("a", "1")]),
            row(&[("b", "2"), ("c", "3")]),
            row(&[]),
            row(&[("a", "4"), ("@ptr", "p")]),
        ];
        let records = flatten(&rows);
        assert_eq!(records.len(), rows.len());
        assert_eq!(Value::Object(records[0].clone()), json!({"a": "1"}));
        assert_eq!(Value::Object(records[1].clone()), json!({"b": "2", "c": "3"}));
        assert!(records[2].is_empty());
        assert_eq!(Value::Object(records[3].clone()), json!({"a": "4"}));
    }
}
