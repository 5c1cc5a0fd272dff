//! # bench-backend
//!
//! Connection to the shared inference backend:
//!
//! - [`Orchestrator`] owns the backend endpoint and the cache of loaded
//!   models, and drives the backend's load/unload/list management API
//! - [`InferenceClient`] issues one measured chat completion, streaming or
//!   not, and reports token-level timing
//! - [`api`] holds the OpenAI-compatible wire types shared with the mock
//!   backend
//!
//! The backend itself is a black box: anything that answers the management
//! surface in [`api::paths`] and `POST /v1/chat/completions` (with SSE
//! streaming) can be benchmarked.

pub mod api;
pub mod client;
pub mod orchestrator;

pub use client::{InferenceClient, InferenceRequest, TIMEOUT_SENTINEL};
pub use orchestrator::Orchestrator;
