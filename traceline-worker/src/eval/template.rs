use serde_json::Value;
use traceline_store::TraceRow;

/// Renders a judge prompt by substituting `{{variable}}` placeholders.
///
/// The variable mapping is a JSON object from template variable to trace
/// column (`input`, `output`, `name`, `userId`, `sessionId`, `metadata`).
/// Unmapped or absent variables render as the empty string; evaluation
/// templates are user-authored, so rendering never fails.
pub fn render_template(template: &str, mapping: Option<&Value>, trace: &TraceRow) -> String {
    let mut rendered = template.to_owned();

    let Some(Value::Object(mapping)) = mapping else {
        return rendered;
    };

    for (variable, column) in mapping {
        let placeholder = format!("{{{{{variable}}}}}");
        if !rendered.contains(&placeholder) {
            continue;
        }

        let value = column
            .as_str()
            .map(|column| column_value(column, trace))
            .unwrap_or_default();
        rendered = rendered.replace(&placeholder, &value);
    }

    rendered
}

fn column_value(column: &str, trace: &TraceRow) -> String {
    match column {
        "name" => trace.name.clone().unwrap_or_default(),
        "userId" => trace.user_id.clone().unwrap_or_default(),
        "sessionId" => trace.session_id.clone().unwrap_or_default(),
        "input" => trace.input.as_ref().map(json_text).unwrap_or_default(),
        "output" => trace.output.as_ref().map(json_text).unwrap_or_default(),
        "metadata" => trace.metadata.as_ref().map(json_text).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Plain strings render without quotes; everything else as compact JSON.
fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
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
            name: Some("summarize".to_owned()),
            user_id: None,
            session_id: None,
            input: Some(json!({ "question": "why?" })),
            output: Some(json!("because")),
            metadata: None,
            tags: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn substitutes_mapped_variables() {
        let rendered = render_template(
            "Rate the answer.\nQ: {{query}}\nA: {{answer}}",
            Some(&json!({ "query": "input", "answer": "output" })),
            &trace(),
        );

        assert_eq!(
            rendered,
            "Rate the answer.\nQ: {\"question\":\"why?\"}\nA: because"
        );
    }

    #[test]
    fn unmapped_variables_stay_missing_values_render_empty() {
        let rendered = render_template(
            "{{query}} / {{user}} / {{unmapped}}",
            Some(&json!({ "query": "input", "user": "userId" })),
            &trace(),
        );

        assert_eq!(rendered, "{\"question\":\"why?\"} /  / {{unmapped}}");
    }

    #[test]
    fn no_mapping_returns_template_verbatim() {
        let rendered = render_template("static prompt", None, &trace());
        assert_eq!(rendered, "static prompt");
    }
}
