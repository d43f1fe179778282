pub mod engine;
pub mod group;
pub mod materialize;

pub use engine::{run_loop, run_tick, ClusterDeps, TickOutcome};
pub use group::{cluster_batch, Cluster, ClusterParams};
pub use materialize::{materialize, MaterializedBattle};
