use serde_json::Value;
use traceline_store::TraceRow;

/// Evaluates a rule's trace filter.
///
/// Filters are a JSON array of conditions, all of which must hold:
///
/// ```json
/// [{ "column": "name", "operator": "=", "value": "chat-completion" }]
/// ```
///
/// Supported columns: `name`, `userId`, `sessionId`, `release`, `version`,
/// `tags`. Supported operators: `=`, `contains`, `anyOf`. A missing or
/// empty filter matches every trace; an unparseable condition matches
/// nothing, so a broken rule fails visibly rather than evaluating the whole
/// project.
pub fn trace_matches(filter: Option<&Value>, trace: &TraceRow) -> bool {
    let conditions = match filter {
        None | Some(Value::Null) => return true,
        Some(Value::Array(conditions)) => conditions,
        Some(_) => return false,
    };

    conditions.iter().all(|condition| matches_one(condition, trace))
}

fn matches_one(condition: &Value, trace: &TraceRow) -> bool {
    let Some(column) = condition.get("column").and_then(Value::as_str) else {
        return false;
    };
    let Some(operator) = condition.get("operator").and_then(Value::as_str) else {
        return false;
    };
    let value = condition.get("value").unwrap_or(&Value::Null);

    if column == "tags" {
        return match (operator, value) {
            ("contains", Value::String(tag)) => trace.tags.iter().any(|t| t == tag),
            ("anyOf", Value::Array(tags)) => tags
                .iter()
                .filter_map(Value::as_str)
                .any(|tag| trace.tags.iter().any(|t| t == tag)),
            _ => false,
        };
    }

    let actual = match column {
        "name" => trace.name.as_deref(),
        "userId" => trace.user_id.as_deref(),
        "sessionId" => trace.session_id.as_deref(),
        _ => None,
    };

    let Some(actual) = actual else {
        return false;
    };

    match (operator, value) {
        ("=", Value::String(expected)) => actual == expected,
        ("contains", Value::String(expected)) => actual.contains(expected.as_str()),
        ("anyOf", Value::Array(expected)) => expected
            .iter()
            .filter_map(Value::as_str)
            .any(|candidate| candidate == actual),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn trace() -> TraceRow {
        TraceRow {
            id: "t-1".to_owned(),
            name: Some("chat-completion".to_owned()),
            user_id: Some("user-7".to_owned()),
            session_id: None,
            input: None,
            output: None,
            metadata: None,
            tags: vec!["prod".to_owned(), "beta".to_owned()],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn missing_filter_matches_everything() {
        assert!(trace_matches(None, &trace()));
        assert!(trace_matches(Some(&Value::Null), &trace()));
        assert!(trace_matches(Some(&json!([])), &trace()));
    }

    #[test]
    fn equality_on_name() {
        let filter = json!([{ "column": "name", "operator": "=", "value": "chat-completion" }]);
        assert!(trace_matches(Some(&filter), &trace()));

        let filter = json!([{ "column": "name", "operator": "=", "value": "other" }]);
        assert!(!trace_matches(Some(&filter), &trace()));
    }

    #[test]
    fn all_conditions_must_hold() {
        let filter = json!([
            { "column": "name", "operator": "contains", "value": "chat" },
            { "column": "userId", "operator": "anyOf", "value": ["user-7", "user-8"] },
        ]);
        assert!(trace_matches(Some(&filter), &trace()));

        let filter = json!([
            { "column": "name", "operator": "contains", "value": "chat" },
            { "column": "userId", "operator": "=", "value": "someone-else" },
        ]);
        assert!(!trace_matches(Some(&filter), &trace()));
    }

    #[test]
    fn tag_operators() {
        let filter = json!([{ "column": "tags", "operator": "contains", "value": "prod" }]);
        assert!(trace_matches(Some(&filter), &trace()));

        let filter = json!([{ "column": "tags", "operator": "anyOf", "value": ["staging", "beta"] }]);
        assert!(trace_matches(Some(&filter), &trace()));

        let filter = json!([{ "column": "tags", "operator": "contains", "value": "staging" }]);
        assert!(!trace_matches(Some(&filter), &trace()));
    }

    #[test]
    fn malformed_conditions_match_nothing() {
        let filter = json!([{ "operator": "=", "value": "x" }]);
        assert!(!trace_matches(Some(&filter), &trace()));

        let filter = json!({ "column": "name" });
        assert!(!trace_matches(Some(&filter), &trace()));

        let filter = json!([{ "column": "name", "operator": "regex", "value": ".*" }]);
        assert!(!trace_matches(Some(&filter), &trace()));
    }
}
