//! # bench-runner
//!
//! The benchmark execution engine:
//!
//! - [`ScenarioRunner`] executes one (model, scenario) pair: N measured
//!   iterations with resource sampling and aggregate statistics
//! - [`RunCoordinator`] drives an entire run across the model × scenario
//!   matrix, owns the run's durable state machine, and reports progress
//! - [`StatusRegistry`] is the in-memory mirror of active run progress for
//!   external observers
//! - [`BenchService`] is the operation surface a REST binding would expose
//! - [`SuiteLibrary`] loads scenario suites from YAML files on disk
//!
//! Execution is single-threaded per run: iterations, scenarios, and models
//! are strictly sequential, and background submissions are serialized so the
//! shared backend never sees two interleaved runs.

pub mod coordinator;
pub mod registry;
pub mod scenario;
pub mod service;
pub mod stats;
pub mod suite;

pub use coordinator::{RunCoordinator, RunProgress, RunProgressFn, RunRequest};
pub use registry::{RunState, StatusRegistry};
pub use scenario::{IterationProgress, ScenarioOutcome, ScenarioRunner};
pub use service::{BenchService, ExportFormat, RunDetails, RunStatusReport, StartRunParams};
pub use suite::SuiteLibrary;
