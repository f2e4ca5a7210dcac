//! Query-string assembly.
//!
//! Two encodings coexist on the wire:
//! - GET/DELETE query maps use repeated bare keys (`tag=a&tag=b`), never
//!   bracket-suffixed array keys.
//! - Param maps on other methods use nested-bracket encoding
//!   (`filter[status]=done`, `ids[0]=7`).

use serde_json::{Map, Value};
use url::Url;

/// Append a query map as repeated `k=v` pairs. Arrays repeat the bare key
/// once per element; `null` values are skipped.
pub fn append_repeat_query(url: &mut Url, params: &Map<String, Value>) {
    let mut pairs = url.query_pairs_mut();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.append_pair(key, &scalar_text(item));
                }
            }
            other => {
                pairs.append_pair(key, &scalar_text(other));
            }
        }
    }
}

/// Append a param map using nested-bracket encoding for objects and arrays.
pub fn append_bracket_query(url: &mut Url, params: &Map<String, Value>) {
    let mut flat: Vec<(String, String)> = Vec::new();
    for (key, value) in params {
        flatten(key.clone(), value, &mut flat);
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in &flat {
        pairs.append_pair(key, value);
    }
}

fn flatten(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten(format!("{key}[{k}]"), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(format!("{key}[{i}]"), v, out);
            }
        }
        other => out.push((key, scalar_text(other))),
    }
}

/// Render a scalar the way it appears in a query string (no JSON quoting).
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://api.example.com/list").unwrap()
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn repeat_encoding_repeats_bare_keys() {
        let mut url = base();
        append_repeat_query(
            &mut url,
            &as_map(json!({"page": 2, "tag": ["a", "b"], "skip": null})),
        );
        assert_eq!(url.query(), Some("page=2&tag=a&tag=b"));
    }

    #[test]
    fn bracket_encoding_handles_nesting() {
        let mut url = base();
        append_bracket_query(
            &mut url,
            &as_map(json!({"filter": {"status": "done"}, "ids": [7, 9]})),
        );
        let query = url.query().unwrap();
        // Brackets are percent-encoded by the serializer; decode for clarity.
        let decoded: String = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| format!("{k}={v}&"))
            .collect();
        assert_eq!(decoded, "filter[status]=done&ids[0]=7&ids[1]=9&");
    }

    #[test]
    fn strings_are_not_json_quoted() {
        let mut url = base();
        append_repeat_query(&mut url, &as_map(json!({"name": "red chair"})));
        assert_eq!(url.query(), Some("name=red+chair"));
    }
}
