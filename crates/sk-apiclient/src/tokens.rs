//! Bearer token rotation for authenticated endpoints.
//!
//! Tokens are fetched from an adjacent auth service and cached for 5
//! minutes; requests dispatch round-robin across the live set. A token
//! that draws 401/403 is marked failed and excluded until the next refresh.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::warn;

const TOKEN_LIST_TTL: Duration = Duration::from_secs(300);

struct TokenSlot {
    value: String,
    failed: bool,
}

struct TokenSet {
    slots: Vec<TokenSlot>,
    fetched_at: Instant,
}

/// Fetches the live token list. Production code backs this with the auth
/// service's HTTP endpoint; tests can supply a closure-free static list.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_tokens(&self) -> Result<Vec<String>>;
}

pub struct TokenRotation<S: TokenSource> {
    source: S,
    state: RwLock<Option<TokenSet>>,
    cursor: AtomicUsize,
}

impl<S: TokenSource> TokenRotation<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: RwLock::new(None),
            cursor: AtomicUsize::new(0),
        }
    }

    async fn ensure_fresh(&self) -> Result<()> {
        let needs_refresh = {
            let guard = self.state.read().await;
            match guard.as_ref() {
                Some(set) => set.fetched_at.elapsed() > TOKEN_LIST_TTL,
                None => true,
            }
        };
        if needs_refresh {
            self.refresh().await?;
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let tokens = self.source.fetch_tokens().await?;
        let mut guard = self.state.write().await;
        *guard = Some(TokenSet {
            slots: tokens
                .into_iter()
                .map(|value| TokenSlot {
                    value,
                    failed: false,
                })
                .collect(),
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    /// The next live token in round-robin order, refreshing the list if
    /// it's stale or if every token has been marked failed.
    pub async fn next_token(&self) -> Result<Option<String>> {
        self.ensure_fresh().await?;

        {
            let guard = self.state.read().await;
            if let Some(set) = guard.as_ref() {
                let live: Vec<&str> = set
                    .slots
                    .iter()
                    .filter(|s| !s.failed)
                    .map(|s| s.value.as_str())
                    .collect();
                if !live.is_empty() {
                    let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % live.len();
                    return Ok(Some(live[idx].to_string()));
                }
            }
        }

        // Every token failed — force a refresh and try once more.
        self.refresh().await?;
        let guard = self.state.read().await;
        Ok(guard
            .as_ref()
            .and_then(|set| set.slots.first())
            .map(|s| s.value.clone()))
    }

    /// Mark a token failed (401/403 response) so subsequent calls skip it,
    /// then force a token-list refresh per spec.
    pub async fn mark_failed(&self, token: &str) {
        {
            let mut guard = self.state.write().await;
            if let Some(set) = guard.as_mut() {
                for slot in set.slots.iter_mut() {
                    if slot.value == token {
                        slot.failed = true;
                    }
                }
            }
        }
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "token refresh after failure did not complete");
        }
    }
}

/// Object-safe facade over `TokenRotation<S>` so `HttpIdentityClient` can
/// hold one without naming the concrete `TokenSource` type.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire(&self) -> Result<Option<String>>;
    async fn report_failure(&self, token: &str);
}

#[async_trait::async_trait]
impl<S: TokenSource> TokenProvider for TokenRotation<S> {
    async fn acquire(&self) -> Result<Option<String>> {
        self.next_token().await
    }

    async fn report_failure(&self, token: &str) {
        self.mark_failed(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StaticSource(Vec<String>);

    #[async_trait::async_trait]
    impl TokenSource for StaticSource {
        async fn fetch_tokens(&self) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn rotation_cycles_round_robin() {
        let rotation = TokenRotation::new(StaticSource(vec!["a".into(), "b".into()]));
        let first = rotation.next_token().await.unwrap().unwrap();
        let second = rotation.next_token().await.unwrap().unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn failed_token_is_excluded_until_refresh() {
        let rotation = TokenRotation::new(StaticSource(vec!["a".into(), "b".into()]));
        rotation.next_token().await.unwrap();
        rotation.mark_failed("a").await;
        for _ in 0..4 {
            let t = rotation.next_token().await.unwrap().unwrap();
            assert_ne!(t, "a");
        }
    }

    #[tokio::test]
    async fn token_provider_facade_delegates_to_rotation() {
        let rotation: Arc<dyn TokenProvider> =
            Arc::new(TokenRotation::new(StaticSource(vec!["a".into(), "b".into()])));
        let first = rotation.acquire().await.unwrap().unwrap();
        rotation.report_failure(&first).await;
        for _ in 0..4 {
            let t = rotation.acquire().await.unwrap().unwrap();
            assert_ne!(t, first);
        }
    }
}
