//! External identity API client (C3): resolves character/corporation/
//! alliance ids (and static universe data) into names, behind a two-tier
//! cache and a shared, distributed rate limit.

mod client;
mod ratelimit;
mod tokens;

pub use client::HttpIdentityClient;
pub use ratelimit::request_cost;
pub use tokens::{TokenProvider, TokenRotation, TokenSource};

use anyhow::Result;
use async_trait::async_trait;
use sk_schemas::DomainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Character,
    Corporation,
    Alliance,
    /// Ship types, regions, and other data that basically never changes.
    UniverseStatic,
}

impl ResourceClass {
    pub fn cache_ttl(self) -> std::time::Duration {
        match self {
            ResourceClass::UniverseStatic => std::time::Duration::from_secs(24 * 3600),
            _ => std::time::Duration::from_secs(3600),
        }
    }

    pub(crate) fn path_segment(self) -> &'static str {
        match self {
            ResourceClass::Character => "characters",
            ResourceClass::Corporation => "corporations",
            ResourceClass::Alliance => "alliances",
            ResourceClass::UniverseStatic => "universe/types",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResolvedIdentity {
    pub id: DomainId,
    pub name: String,
    pub ticker: Option<String>,
}

/// Capability interface for identity resolution. Production code talks to
/// `HttpIdentityClient`; tests substitute `FakeIdentityResolver`.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(
        &self,
        class: ResourceClass,
        id: DomainId,
    ) -> Result<Option<ResolvedIdentity>>;
}

/// In-memory resolver for tests: returns whatever was seeded, `None`
/// otherwise, never touches the network.
#[derive(Default)]
pub struct FakeIdentityResolver {
    entries: std::sync::Mutex<std::collections::HashMap<(ResourceClassKey, u64), ResolvedIdentity>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ResourceClassKey(u8);

impl From<ResourceClass> for ResourceClassKey {
    fn from(c: ResourceClass) -> Self {
        ResourceClassKey(match c {
            ResourceClass::Character => 0,
            ResourceClass::Corporation => 1,
            ResourceClass::Alliance => 2,
            ResourceClass::UniverseStatic => 3,
        })
    }
}

impl FakeIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, class: ResourceClass, identity: ResolvedIdentity) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((class.into(), identity.id.get()), identity);
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentityResolver {
    async fn resolve(
        &self,
        class: ResourceClass,
        id: DomainId,
    ) -> Result<Option<ResolvedIdentity>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&(class.into(), id.get())).cloned())
    }
}
