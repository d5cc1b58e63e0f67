use serde_json::Value;

/// Removes NUL (`\u{0000}`) characters from every string in the value.
///
/// Some SDKs forward raw model output containing NUL bytes, which Postgres
/// text columns reject. Scrubbing recurses through arrays and objects and
/// covers object keys as well. The operation is idempotent.
pub fn scrub_nul(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(scrub_str(&s)),
        Value::Array(values) => Value::Array(values.into_iter().map(scrub_nul).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (scrub_str(&key), scrub_nul(value)))
                .collect(),
        ),
        other => other,
    }
}

fn scrub_str(s: &str) -> String {
    if s.contains('\u{0000}') {
        s.replace('\u{0000}', "")
    } else {
        s.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scrubs_nested_strings() {
        let scrubbed = scrub_nul(json!({
            "text": "hi\u{0000}there",
            "nested": { "list": ["a\u{0000}", "b"] },
            "count": 3,
        }));

        assert_eq!(
            scrubbed,
            json!({
                "text": "hithere",
                "nested": { "list": ["a", "b"] },
                "count": 3,
            })
        );
    }

    #[test]
    fn scrubs_object_keys() {
        let scrubbed = scrub_nul(json!({ "bad\u{0000}key": true }));
        assert_eq!(scrubbed, json!({ "badkey": true }));
    }

    #[test]
    fn idempotent() {
        let input = json!({ "text": "a\u{0000}b", "n": null });
        let once = scrub_nul(input);
        let twice = scrub_nul(once.clone());
        assert_eq!(once, twice);
    }
}
