//! HTTP API.
//!
//! ## Endpoints
//! - `GET  /health`
//! - `POST /api/ai/discover-process`
//! - `POST /api/ai/optimize-process`
//! - `GET  /api/ai/task/:task_id`
//! - `POST /api/ai/task/:task_id/cancel`
//! - `GET  /api/ai/tasks`
//! - `POST /api/ai/analyze-document`
//! - `POST /api/ai/semantic-search`

mod ai;
mod error;
mod routes;
pub mod types;

pub use error::{ApiError, ApiJson, ApiPath, ApiQuery};
pub use routes::{router, serve, AppState, SERVICE_NAME};
