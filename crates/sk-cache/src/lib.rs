//! Shared Redis-backed cache, rate-limit ledger, and cross-replica event
//! bus (C0). Every service that needs to coordinate with its siblings —
//! the query API's SSE fan-out, the ruleset cache's invalidation, the
//! identity client's shared rate-limit budget — goes through this crate
//! rather than talking to Redis directly.

pub mod bus;
pub mod ledger;
pub mod store;

pub use bus::{Bus, BusEvent};
pub use ledger::{InMemoryRateLimitLedger, RateLimitLedger, RedisRateLimitLedger};
pub use store::{Cache, FakeCache, L1L2Cache, RedisCache};
