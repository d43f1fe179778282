//! Cost accounting for the floating-window token ledger.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// The upstream's own view of the quota governing this response: which
/// group the request was charged against, its `limit/window`, and how much
/// is left. Not every upstream sends these; callers treat a missing header
/// as "nothing to reconcile" rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub group: String,
    pub limit: i64,
    pub window: Duration,
    pub remaining: i64,
    pub used: i64,
}

/// Parse `X-RateLimit-Resource` / `X-RateLimit-Limit` (`N/window_secs`) /
/// `X-RateLimit-Remaining` / `X-RateLimit-Used` off a response. Returns
/// `None` if any of the four is absent or malformed — a partial read would
/// be worse than no reconciliation at all.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitHeaders> {
    let group = headers.get("x-ratelimit-resource")?.to_str().ok()?.to_string();
    let limit_raw = headers.get("x-ratelimit-limit")?.to_str().ok()?;
    let (limit_str, window_str) = limit_raw.split_once('/')?;
    let limit: i64 = limit_str.trim().parse().ok()?;
    let window_secs: u64 = window_str.trim().parse().ok()?;
    let remaining: i64 = headers
        .get("x-ratelimit-remaining")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    let used: i64 = headers.get("x-ratelimit-used")?.to_str().ok()?.trim().parse().ok()?;

    Some(RateLimitHeaders {
        group,
        limit,
        window: Duration::from_secs(window_secs.max(1)),
        remaining,
        used,
    })
}

/// Ledger cost charged for a response of the given status, per spec's cost
/// table: 2xx -> 2, 3xx -> 1, 4xx -> 5, 5xx -> 0, 429 -> 0.
pub fn request_cost(status: StatusCode) -> i64 {
    if status == StatusCode::TOO_MANY_REQUESTS {
        0
    } else if status.is_success() {
        2
    } else if status.is_redirection() {
        1
    } else if status.is_client_error() {
        5
    } else if status.is_server_error() {
        0
    } else {
        0
    }
}

/// Whether a response counts against the rolling error-limit counter.
pub fn is_error_response(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_table_matches_status_classes() {
        assert_eq!(request_cost(StatusCode::OK), 2);
        assert_eq!(request_cost(StatusCode::FOUND), 1);
        assert_eq!(request_cost(StatusCode::NOT_FOUND), 5);
        assert_eq!(request_cost(StatusCode::INTERNAL_SERVER_ERROR), 0);
        assert_eq!(request_cost(StatusCode::TOO_MANY_REQUESTS), 0);
    }

    #[test]
    fn error_response_classifies_4xx_and_5xx_only() {
        assert!(is_error_response(StatusCode::NOT_FOUND));
        assert!(is_error_response(StatusCode::BAD_GATEWAY));
        assert!(!is_error_response(StatusCode::OK));
        assert!(!is_error_response(StatusCode::FOUND));
    }

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(
                reqwest::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn parses_well_formed_rate_limit_headers() {
        let headers = headers_with(&[
            ("x-ratelimit-resource", "identity-lookup"),
            ("x-ratelimit-limit", "150/900"),
            ("x-ratelimit-remaining", "120"),
            ("x-ratelimit-used", "30"),
        ]);
        let parsed = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(parsed.group, "identity-lookup");
        assert_eq!(parsed.limit, 150);
        assert_eq!(parsed.window, Duration::from_secs(900));
        assert_eq!(parsed.remaining, 120);
        assert_eq!(parsed.used, 30);
    }

    #[test]
    fn missing_header_yields_none() {
        let headers = headers_with(&[("x-ratelimit-remaining", "120")]);
        assert!(parse_rate_limit_headers(&headers).is_none());
    }
}
