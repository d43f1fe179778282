//! Ingestion service (C4): long-poll the upstream killmail feed, filter
//! through the current ruleset, persist admitted events exactly-once, and
//! enqueue them for enrichment.

pub mod filter;
pub mod ingest;
pub mod parse;

pub use filter::AdmissionVerdict;
pub use ingest::{run_iteration, run_loop, IngestDeps, IngestOutcome};
