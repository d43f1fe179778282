//! Production HTTP-backed identity resolver.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sk_cache::{L1L2Cache, RateLimitLedger};
use sk_schemas::DomainId;
use tracing::warn;

use crate::ratelimit::{is_error_response, parse_rate_limit_headers, request_cost};
use crate::tokens::TokenProvider;
use crate::{IdentityResolver, ResolvedIdentity, ResourceClass};

const RATE_LIMIT_KEY: &str = "identity-api:quota";
const ERROR_LIMIT_KEY: &str = "identity-api:errors";
const ERROR_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const ERROR_LIMIT_CAP: i64 = 100;
const QUOTA_WINDOW: Duration = Duration::from_secs(15 * 60);
const QUOTA_N: i64 = 150;
const MAX_WAIT_PER_ITERATION: Duration = Duration::from_secs(5);
const MAX_TOTAL_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    name: String,
    #[serde(default)]
    ticker: Option<String>,
}

pub struct HttpIdentityClient {
    http: reqwest::Client,
    base_url: String,
    cache: L1L2Cache,
    ledger: Arc<dyn RateLimitLedger>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl HttpIdentityClient {
    pub fn new(
        base_url: String,
        timeout: Duration,
        cache: L1L2Cache,
        ledger: Arc<dyn RateLimitLedger>,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            cache,
            ledger,
            tokens,
        })
    }

    fn cache_key(&self, class: ResourceClass, id: DomainId) -> String {
        format!("identity:{}:{}", class.path_segment(), id.get())
    }

    /// Block, if needed, until the shared quota ledger has room for one
    /// more request; gives up after `MAX_TOTAL_WAIT` rather than stalling
    /// forever on a misbehaving upstream.
    async fn wait_for_quota(&self) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            let held = QUOTA_N - self.ledger.spend(RATE_LIMIT_KEY, 0, QUOTA_WINDOW).await?;
            if held > 0 {
                return Ok(());
            }
            if started.elapsed() > MAX_TOTAL_WAIT {
                return Err(anyhow!("identity API quota wait exceeded {MAX_TOTAL_WAIT:?}"));
            }
            let jitter = Duration::from_millis(rand::random::<u64>() % 250);
            tokio::time::sleep(MAX_WAIT_PER_ITERATION.min(QUOTA_WINDOW) + jitter).await;
        }
    }

    async fn error_budget_exhausted(&self) -> Result<bool> {
        let count = self.ledger.spend(ERROR_LIMIT_KEY, 0, ERROR_LIMIT_WINDOW).await?;
        Ok(count >= ERROR_LIMIT_CAP)
    }

    async fn fetch_from_upstream(
        &self,
        class: ResourceClass,
        id: DomainId,
    ) -> Result<Option<ResolvedIdentity>> {
        if self.error_budget_exhausted().await? {
            return Err(anyhow!("identity API error budget exhausted for the last 60s"));
        }

        self.wait_for_quota().await?;

        let url = format!(
            "{}/{}/{}/",
            self.base_url.trim_end_matches('/'),
            class.path_segment(),
            id.get()
        );

        let token = match &self.tokens {
            Some(provider) => provider.acquire().await?,
            None => None,
        };

        let mut req = self.http.get(&url);
        if let Some(token) = &token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("identity API request failed")?;

        let status = resp.status();
        let rate_limit_headers = parse_rate_limit_headers(resp.headers());

        let cost = request_cost(status);
        self.ledger.spend(RATE_LIMIT_KEY, cost, QUOTA_WINDOW).await?;
        if is_error_response(status) {
            self.ledger.spend(ERROR_LIMIT_KEY, 1, ERROR_LIMIT_WINDOW).await?;
        }

        if let Some(rl) = &rate_limit_headers {
            if let Err(err) = self
                .ledger
                .reconcile(RATE_LIMIT_KEY, rl.window, rl.limit, rl.remaining)
                .await
            {
                warn!(error = %err, "failed to reconcile rate limit ledger against upstream headers");
            }
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            if let (Some(provider), Some(token)) = (&self.tokens, &token) {
                provider.report_failure(token).await;
            }
            Err(anyhow!("identity API rejected credentials ({status}); token marked failed"))
        } else if status == StatusCode::NOT_FOUND {
            Ok(None)
        } else if status.as_u16() == 420 {
            warn!("identity API returned 420, pausing 60s");
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(anyhow!("identity API rate-limited (420); retry later"))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5);
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            Err(anyhow!("identity API rate-limited (429); retry later"))
        } else if status.is_success() {
            let body: IdentityResponse = resp
                .json()
                .await
                .context("identity API response decode failed")?;
            Ok(Some(ResolvedIdentity {
                id,
                name: body.name,
                ticker: body.ticker,
            }))
        } else {
            Err(anyhow!("identity API returned unexpected status {status}"))
        }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityClient {
    async fn resolve(
        &self,
        class: ResourceClass,
        id: DomainId,
    ) -> Result<Option<ResolvedIdentity>> {
        let key = self.cache_key(class, id);
        if let Some(cached) = self.cache.get_json::<ResolvedIdentity>(&key).await? {
            return Ok(Some(cached));
        }

        let resolved = self.fetch_from_upstream(class, id).await?;
        if let Some(identity) = &resolved {
            self.cache.set_json(&key, identity, class.cache_ttl()).await?;
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_namespaced_by_resource_class() {
        // Pure function, no client construction needed.
        let a = format!("identity:{}:{}", ResourceClass::Character.path_segment(), 1);
        let b = format!("identity:{}:{}", ResourceClass::Corporation.path_segment(), 1);
        assert_ne!(a, b);
    }
}
