//! Analysis plans: what a task asks the model and how its reply is read.

mod parse;
mod prompts;

pub use parse::{parse_result, RAW_RESPONSE_KEY};
pub use prompts::{discovery_prompt, optimization_prompt};

use serde_json::{json, Map, Value};

use crate::task::TaskKind;

/// Input captured for a discovery task.
#[derive(Debug, Clone)]
pub struct DiscoveryInput {
    pub document_text: Option<String>,
    pub document_url: Option<String>,
    pub context: Option<Map<String, Value>>,
}

/// Input captured for an optimization task.
#[derive(Debug, Clone)]
pub struct OptimizationInput {
    pub process_id: String,
    pub current_metrics: Map<String, Value>,
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
}

/// A unit of analysis work handed to the task runner.
#[derive(Debug, Clone)]
pub enum AnalysisPlan {
    Discovery(DiscoveryInput),
    Optimization(OptimizationInput),
}

impl AnalysisPlan {
    pub fn kind(&self) -> TaskKind {
        match self {
            AnalysisPlan::Discovery(_) => TaskKind::ProcessDiscovery,
            AnalysisPlan::Optimization(_) => TaskKind::WorkflowOptimization,
        }
    }

    /// Build the prompt for this plan.
    ///
    /// Fails when the input cannot produce a meaningful prompt; the message is
    /// shown to API clients as the task error.
    pub fn prompt(&self) -> Result<String, String> {
        match self {
            AnalysisPlan::Discovery(input) => {
                let text = input
                    .document_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty());
                match text {
                    Some(text) => Ok(discovery_prompt(text, input.context.as_ref())),
                    None if input.document_url.is_some() => Err(
                        "document_text is required; fetching documents from document_url is not supported"
                            .to_string(),
                    ),
                    None => Err("document_text is required for process discovery".to_string()),
                }
            }
            AnalysisPlan::Optimization(input) => Ok(optimization_prompt(
                &input.process_id,
                &input.current_metrics,
                &input.goals,
                &input.constraints,
            )),
        }
    }

    /// Summary of the input kept on the task record.
    pub fn input_summary(&self) -> Value {
        match self {
            AnalysisPlan::Discovery(input) => json!({
                "document_text_chars": input.document_text.as_ref().map(|t| t.chars().count()),
                "document_url": input.document_url,
                "context": input.context,
            }),
            AnalysisPlan::Optimization(input) => json!({
                "process_id": input.process_id,
                "current_metrics": input.current_metrics,
                "goals": input.goals,
                "constraints": input.constraints,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(text: Option<&str>, url: Option<&str>) -> AnalysisPlan {
        AnalysisPlan::Discovery(DiscoveryInput {
            document_text: text.map(String::from),
            document_url: url.map(String::from),
            context: None,
        })
    }

    #[test]
    fn test_discovery_requires_text() {
        assert!(discovery(Some("Orders are shipped."), None).prompt().is_ok());
        assert!(discovery(Some("   "), None)
            .prompt()
            .unwrap_err()
            .contains("document_text is required"));
        assert!(discovery(None, Some("https://example.com/manual.pdf"))
            .prompt()
            .unwrap_err()
            .contains("document_url is not supported"));
    }

    #[test]
    fn test_input_summary_does_not_copy_document() {
        let summary = discovery(Some("secret contract text"), None).input_summary();
        assert_eq!(summary["document_text_chars"], 20);
        assert!(!summary.to_string().contains("secret"));
    }
}
