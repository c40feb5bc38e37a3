//! SignalStore: embedded, single-writer persistence for the pipeline.
//!
//! Owns the SQLite file. Three logical tables: raw signals, per-signal
//! processing records, and the suppression cache mirroring the CRM. Every
//! multi-step mutation runs in one transaction; idempotent ingestion is
//! the store's job, not the caller's.

pub mod migrate;
pub mod store;

pub use store::{SignalStore, StoreStats};
