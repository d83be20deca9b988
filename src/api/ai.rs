//! AI analysis endpoints.
//!
//! Provides endpoints for:
//! - Submitting process discovery and optimization tasks
//! - Polling, listing and cancelling tasks
//! - Document analysis and semantic search (canned payloads)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map};

use super::error::{ApiError, ApiJson, ApiPath, ApiQuery};
use super::routes::AppState;
use super::types::*;
use crate::analysis::{AnalysisPlan, DiscoveryInput, OptimizationInput};
use crate::task::{TaskRecord, TaskStatus};

/// Create the AI routes, nested under `/api/ai`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/discover-process", post(discover_process))
        .route("/optimize-process", post(optimize_process))
        .route("/task/:task_id", get(get_task_status))
        .route("/task/:task_id/cancel", post(cancel_task))
        .route("/tasks", get(list_tasks))
        .route("/analyze-document", post(analyze_document))
        .route("/semantic-search", post(semantic_search))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/ai/discover-process - Extract a business process from a document.
async fn discover_process(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<DiscoveryRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let plan = AnalysisPlan::Discovery(DiscoveryInput {
        document_text: req.document_text,
        document_url: req.document_url,
        context: req.context,
    });

    let task_id = state.runner.submit(plan).await?;
    Ok(Json(TaskResponse::accepted(task_id)))
}

/// POST /api/ai/optimize-process - Suggest optimizations for a process.
async fn optimize_process(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<OptimizationRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let process_id = req.process_id.trim();
    if process_id.is_empty() {
        return Err(ApiError::Validation("process_id cannot be empty".to_string()));
    }

    let plan = AnalysisPlan::Optimization(OptimizationInput {
        process_id: process_id.to_string(),
        current_metrics: req.current_metrics,
        goals: req.goals,
        constraints: req.constraints,
    });

    let task_id = state.runner.submit(plan).await?;
    Ok(Json(TaskResponse::accepted(task_id)))
}

/// GET /api/ai/task/:task_id - Current status and result of a task.
async fn get_task_status(
    State(state): State<Arc<AppState>>,
    ApiPath(task_id): ApiPath<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    state
        .runner
        .store()
        .get(&task_id)
        .await
        .map(|record| Json(record.into()))
        .ok_or_else(|| task_not_found(&task_id))
}

/// POST /api/ai/task/:task_id/cancel - Cancel a pending or running task.
async fn cancel_task(
    State(state): State<Arc<AppState>>,
    ApiPath(task_id): ApiPath<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let record = state
        .runner
        .store()
        .cancel(&task_id)
        .await
        .ok_or_else(|| task_not_found(&task_id))?;

    if record.status != TaskStatus::Cancelled {
        return Err(ApiError::Conflict(format!(
            "Task {} is not running (status: {})",
            task_id, record.status
        )));
    }

    tracing::info!(task_id = %task_id, "Cancelled task on request");
    Ok(Json(record.into()))
}

/// GET /api/ai/tasks - All known tasks, newest first.
async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskRecord>> {
    Json(state.runner.store().list().await)
}

fn task_not_found(task_id: &str) -> ApiError {
    ApiError::NotFound(format!("Task {} not found", task_id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Canned endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/ai/analyze-document - Describe the processes found in a document.
///
/// The document is not fetched; the payload documents the response contract.
async fn analyze_document(
    ApiQuery(query): ApiQuery<AnalyzeDocumentParams>,
    body: Option<Json<AnalyzeDocumentParams>>,
) -> Result<Json<DocumentAnalysisResponse>, ApiError> {
    let non_blank = |url: &String| !url.trim().is_empty();
    let document_url = query
        .document_url
        .filter(non_blank)
        .or_else(|| body.and_then(|Json(b)| b.document_url).filter(non_blank))
        .ok_or_else(|| ApiError::Validation("document_url is required".to_string()))?;

    tracing::debug!(document_url = %document_url, "Document analysis requested");

    Ok(Json(DocumentAnalysisResponse {
        document_type: "process_manual".to_string(),
        extracted_processes: vec![ExtractedProcess {
            name: "Customer Onboarding".to_string(),
            steps: 8,
            estimated_time: "2-3 days".to_string(),
            complexity: "medium".to_string(),
        }],
        confidence: 0.85,
    }))
}

/// POST /api/ai/semantic-search - Search workflows and processes.
///
/// Results come from a fixed catalogue, filtered by resource type and limit.
async fn semantic_search(
    ApiJson(req): ApiJson<SemanticSearchRequest>,
) -> Result<Json<SemanticSearchResponse>, ApiError> {
    let started = Instant::now();

    if req.query.trim().is_empty() {
        return Err(ApiError::Validation("query cannot be empty".to_string()));
    }
    if !(1..=MAX_SEARCH_LIMIT).contains(&req.limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_SEARCH_LIMIT
        )));
    }

    let results: Vec<SearchHit> = search_catalogue()
        .into_iter()
        .filter(|hit| {
            req.resource_types
                .as_ref()
                .map_or(true, |types| types.contains(&hit.resource_type))
        })
        .take(req.limit)
        .collect();

    Ok(Json(SemanticSearchResponse {
        total_results: results.len(),
        results,
        execution_time: started.elapsed().as_secs_f64(),
        query: req.query,
    }))
}

fn search_catalogue() -> Vec<SearchHit> {
    let mut metadata = Map::new();
    metadata.insert("department".to_string(), json!("HR"));
    metadata.insert("last_updated".to_string(), json!("2024-01-15"));

    vec![SearchHit {
        id: "workflow_123".to_string(),
        resource_type: ResourceType::Workflow,
        title: "Employee Onboarding Process".to_string(),
        content: "Complete workflow for new employee setup...".to_string(),
        score: 0.92,
        metadata,
    }]
}
