//! # bench-store
//!
//! Durable persistence for tokenbench.
//!
//! This crate provides [`JsonStore`], a file-backed implementation of the
//! [`bench_core::Repository`] contract. The whole store is one JSON document
//! that is atomically replaced on every mutation (write to a temporary file,
//! then rename), with an in-memory mirror serving reads.
//!
//! The store is sized for a single-host benchmarking workload: a handful of
//! models, tens of runs, and a bounded audit log ring. Anything larger should
//! implement `Repository` over a real database instead.

pub mod json;

pub use json::JsonStore;
