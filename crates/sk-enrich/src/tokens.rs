//! Reads the identity API's bearer tokens from an env var named by
//! `EnrichConfig::auth_tokens_env_var`, comma-separated.

use anyhow::{Context, Result};
use sk_apiclient::TokenSource;

pub struct EnvTokenSource {
    var_name: String,
}

impl EnvTokenSource {
    pub fn new(var_name: String) -> Self {
        Self { var_name }
    }
}

#[async_trait::async_trait]
impl TokenSource for EnvTokenSource {
    async fn fetch_tokens(&self) -> Result<Vec<String>> {
        let raw = std::env::var(&self.var_name)
            .with_context(|| format!("missing env var {}", self.var_name))?;
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_and_trims_comma_separated_tokens() {
        std::env::set_var("SK_ENRICH_TEST_TOKENS", " a , b,c ");
        let source = EnvTokenSource::new("SK_ENRICH_TEST_TOKENS".to_string());
        let tokens = source.fetch_tokens().await.unwrap();
        assert_eq!(tokens, vec!["a", "b", "c"]);
        std::env::remove_var("SK_ENRICH_TEST_TOKENS");
    }
}
