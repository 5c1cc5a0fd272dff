//! # bench-dev
//!
//! Development and test infrastructure for tokenbench.
//!
//! [`MockBackendServer`] is an in-process inference backend speaking the same
//! management and chat-completion surface as a real one, with scripted
//! per-model behavior: token counts, first-token and inter-token delays,
//! health or load failures, and stalls that never answer. Tests point the
//! orchestrator at its URL and get deterministic end-to-end coverage without
//! a model in sight.

pub mod mock;

pub use mock::{MockBackendServer, MockModelBehavior};
