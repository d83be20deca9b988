//! Prompt construction for process discovery and optimization.

use serde_json::{Map, Value};

/// Build the prompt asking the model to extract a business process from a document.
pub fn discovery_prompt(document_text: &str, context: Option<&Map<String, Value>>) -> String {
    let mut prompt = String::from(
        "Analyze the following business document and extract the business process steps.\n\n",
    );
    prompt.push_str("Document:\n");
    prompt.push_str(document_text.trim());
    prompt.push_str("\n\n");

    if let Some(context) = context.filter(|c| !c.is_empty()) {
        prompt.push_str("Context:\n");
        prompt.push_str(&render_map(context));
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Please identify:\n\
         1. Main process steps in chronological order\n\
         2. Decision points and branches\n\
         3. Roles and responsibilities\n\
         4. Inputs and outputs for each step\n\
         5. Potential bottlenecks or inefficiencies\n\n\
         Respond with a JSON object with the keys \"steps\", \"decision_points\", \
         \"stakeholders\" and \"insights\".",
    );
    prompt
}

/// Build the prompt asking the model for optimization recommendations.
pub fn optimization_prompt(
    process_id: &str,
    metrics: &Map<String, Value>,
    goals: &[String],
    constraints: &[String],
) -> String {
    let mut prompt = String::from(
        "Analyze the following business process and suggest optimizations.\n\n",
    );
    prompt.push_str(&format!("Process ID: {}\n", process_id));
    prompt.push_str(&format!("Current Metrics:\n{}\n", render_map(metrics)));
    prompt.push_str(&format!("Goals:\n{}\n", render_list(goals)));
    prompt.push_str(&format!("Constraints:\n{}\n\n", render_list(constraints)));
    prompt.push_str(
        "Please provide:\n\
         1. Specific optimization recommendations\n\
         2. Expected impact on metrics\n\
         3. Implementation difficulty\n\
         4. Risk assessment\n\
         5. Step-by-step implementation plan\n\n\
         Respond with a JSON object with the keys \"insights\" (list of strings) and \
         \"recommendations\" (list of objects with \"title\", \"description\", \"impact\", \
         \"effort\", \"risk\" and \"steps\"), ordered by priority.",
    );
    prompt
}

fn render_map(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("- {}: {}", key, s),
            other => format!("- {}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_discovery_prompt_includes_document_and_context() {
        let context = object(json!({ "department": "Finance" }));
        let prompt = discovery_prompt("  Invoices are approved by a manager.  ", Some(&context));
        assert!(prompt.contains("Document:\nInvoices are approved by a manager.\n"));
        assert!(prompt.contains("- department: Finance"));
        assert!(prompt.contains("Decision points"));
    }

    #[test]
    fn test_discovery_prompt_skips_empty_context() {
        let prompt = discovery_prompt("text", Some(&Map::new()));
        assert!(!prompt.contains("Context:"));
    }

    #[test]
    fn test_optimization_prompt() {
        let metrics = object(json!({ "cycle_time": 10 }));
        let prompt = optimization_prompt("p1", &metrics, &["reduce cost".to_string()], &[]);
        assert!(prompt.contains("Process ID: p1"));
        assert!(prompt.contains("- cycle_time: 10"));
        assert!(prompt.contains("Goals:\n- reduce cost"));
        assert!(prompt.contains("Constraints:\n- none"));
    }
}
