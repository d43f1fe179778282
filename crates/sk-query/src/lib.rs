//! Query surface (C7): paginated battle/killmail queries, an SSE tail, and
//! ruleset CRUD, all hydrated with names via C8.

pub mod api_types;
pub mod error;
pub mod hydrate;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
