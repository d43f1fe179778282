//! Identity enrichment worker (C5): claims entities from the queue
//! populated by `sk-ingest` and resolves them against the identity API.

pub mod mapping;
pub mod tokens;
pub mod worker;

pub use tokens::EnvTokenSource;
pub use worker::{run_iteration, run_loop, BatchOutcome, EnrichDeps};
