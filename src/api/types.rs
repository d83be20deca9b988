//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::{TaskRecord, TaskStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub service: String,
    pub version: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis tasks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(default)]
    pub document_text: Option<String>,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct OptimizationRequest {
    pub process_id: String,
    pub current_metrics: Map<String, Value>,
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// Status of a task as reported to API clients.
///
/// `pending` and `running` are both reported as `processing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiTaskStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl From<TaskStatus> for AiTaskStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending | TaskStatus::Running => Self::Processing,
            TaskStatus::Completed => Self::Completed,
            TaskStatus::Failed => Self::Failed,
            TaskStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: AiTaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    /// Response for a task that was just accepted.
    pub fn accepted(task_id: String) -> Self {
        Self {
            task_id,
            status: AiTaskStatus::Processing,
            result: None,
            error: None,
        }
    }
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.id,
            status: record.status.into(),
            result: record.result,
            error: record.error,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Document analysis
// ─────────────────────────────────────────────────────────────────────────────

/// `document_url` may arrive in the query string or in a JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeDocumentParams {
    #[serde(default)]
    pub document_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractedProcess {
    pub name: String,
    pub steps: u32,
    pub estimated_time: String,
    pub complexity: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentAnalysisResponse {
    pub document_type: String,
    pub extracted_processes: Vec<ExtractedProcess>,
    pub confidence: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Semantic search
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Workflow,
    Process,
    Document,
    Comment,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    #[serde(default)]
    pub resource_types: Option<Vec<ResourceType>>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SemanticSearchResponse {
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    /// Seconds spent answering the query
    pub execution_time: f64,
    pub query: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
