//! # WorkflowIQ AI Services
//!
//! HTTP service for AI-driven business-process analysis.
//!
//! This library provides:
//! - An HTTP API for submitting discovery and optimization tasks and polling them
//! - A bounded background runner that executes tasks against an AI provider
//! - Canned document-analysis and semantic-search endpoints
//!
//! ## Task Flow
//! 1. Receive a request via the API and validate it
//! 2. Record a `pending` task and return its id with status `processing`
//! 3. Build the analysis prompt and submit it to the provider
//! 4. Parse the reply and record `completed`, `failed` or `cancelled`
//!
//! ## Modules
//! - `api`: routes, handlers and error mapping
//! - `analysis`: prompt construction and reply parsing
//! - `llm`: provider client trait and the OpenAI implementation
//! - `task`: task store and runner
//! - `config`: environment-driven configuration

pub mod analysis;
pub mod api;
pub mod config;
pub mod llm;
pub mod task;

pub use config::Config;
