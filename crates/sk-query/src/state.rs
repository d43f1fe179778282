//! Shared runtime state for sk-apid, the query surface (C7).

use std::sync::Arc;

use sk_apiclient::IdentityResolver;
use sk_cache::Bus;
use sk_config::secrets::AuthCollaboratorSecrets;
use sk_ruleset::RulesetCache;

/// Cloneable (Arc-backed) handle shared across every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    /// Cross-replica fan-out for newly-admitted killmails and ruleset
    /// invalidation; the SSE stream subscribes directly to this.
    pub bus: Bus,
    pub ruleset_cache: Arc<RulesetCache>,
    /// Name/affiliation hydration for C7 responses (C8's upstream dependency).
    pub resolver: Arc<dyn IdentityResolver>,
    /// Origins the SSE handler is allowed to echo back in
    /// `access-control-allow-origin`; the global CORS layer handles every
    /// other route.
    pub cors_allowed_origins: Vec<String>,
    /// Resolved once at startup and handed to the authorization collaborator
    /// (OAuth + session store); `None` when that collaborator isn't
    /// deployed alongside this service. This crate never reads the fields
    /// itself beyond passing them through.
    pub auth_collaborator: Option<Arc<AuthCollaboratorSecrets>>,
}
