//! GitHub REST API client with caching and circuit breaker.
//!
//! Fetches issue and pull request titles for reference expansion.
//! Supports optional token-based authentication for higher rate limits.
//!
//! ## Rate limits
//! - Unauthenticated: 60 requests/hour (IP locked)
//! - Token-authenticated: 5,000 requests/hour
//!
//! ## Circuit breaker
//! After `CIRCUIT_BREAKER_THRESHOLD` consecutive failures, the client enters
//! an open state for `CIRCUIT_BREAKER_COOLDOWN` and reports
//! [`ResolveError::CircuitOpen`] without making HTTP calls. After the
//! cooldown a single trial request decides whether the circuit closes or
//! stays open for another cooldown. A missing issue is an answer, not a
//! failure, and does not count.

use async_trait::async_trait;
use lru::LruCache;
use reqwest::StatusCode;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::detect::IssueReference;
use crate::error::{BridgeError, ResolveError};
use crate::resolve::{IssueLookup, IssueSummary, Resolution};

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default HTTP timeout for GitHub API requests (3 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum cache entries.
const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => unreachable!(),
};

/// Cache TTL (5 minutes).
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Number of consecutive failures before circuit opens.
const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;

/// How long the circuit stays open (60 seconds).
const CIRCUIT_BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

/// Cache entry with expiration.
#[derive(Clone, Debug)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > CACHE_TTL
    }
}

/// Circuit breaker state.
#[derive(Debug)]
struct CircuitBreaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// When the single half-open trial request was let through.
    trial_started: Option<Instant>,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            opened_at: None,
            trial_started: None,
        }
    }

    /// Returns true if a request should be allowed through.
    ///
    /// Once the cooldown has passed the breaker is half-open: one trial
    /// request goes through and the rest are refused until it reports back.
    /// A trial that never reports (cancelled mid-flight) frees the slot after
    /// another cooldown.
    fn allow_request(&mut self) -> bool {
        match self.opened_at {
            None => true,
            Some(opened_at) if opened_at.elapsed() <= CIRCUIT_BREAKER_COOLDOWN => false,
            Some(_) => match self.trial_started {
                Some(started) if started.elapsed() <= CIRCUIT_BREAKER_COOLDOWN => false,
                _ => {
                    self.trial_started = Some(Instant::now());
                    true
                }
            },
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_started = None;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.trial_started = None;
        if self.consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD {
            if self.opened_at.is_none() {
                warn!(
                    threshold = CIRCUIT_BREAKER_THRESHOLD,
                    cooldown_secs = CIRCUIT_BREAKER_COOLDOWN.as_secs(),
                    "GitHub API circuit breaker opened"
                );
            }
            self.opened_at = Some(Instant::now());
        }
    }
}

/// Subset of the issues API response we care about.
///
/// The issues endpoint also answers for pull requests.
#[derive(Debug, Clone, Deserialize)]
struct IssueInfo {
    html_url: String,
    title: String,
}

/// GitHub API client with built-in caching and circuit breaker.
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    /// Keyed by "owner/repo/number".
    issue_cache: Mutex<LruCache<String, CacheEntry<IssueSummary>>>,
    circuit: Mutex<CircuitBreaker>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GitHubClient {
    /// Create a new client against the public API.
    ///
    /// If `token` is `Some`, it will be used for `Authorization: Bearer`
    /// headers. Without one the client is limited to 60 requests/hour, so
    /// use it sparingly.
    pub fn new(token: Option<String>) -> Result<Self, BridgeError> {
        Self::with_api_base(DEFAULT_API_BASE, token)
    }

    /// Create a client against a specific API base URL (GitHub Enterprise,
    /// or a mock server in tests).
    pub fn with_api_base(
        api_base: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("waddle-github-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let token = token.filter(|t| !t.is_empty());
        if token.is_some() {
            debug!("GitHub client initialized with token authentication");
        } else {
            debug!("GitHub client initialized without token (60 req/hr limit)");
        }

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            issue_cache: Mutex::new(LruCache::new(CACHE_CAPACITY)),
            circuit: Mutex::new(CircuitBreaker::new()),
        })
    }

    /// Whether requests carry a token.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Build a request with optional auth header.
    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        // GitHub API v3
        req.header("Accept", "application/vnd.github.v3+json")
    }

    fn cached(&self, key: &str) -> Option<IssueSummary> {
        let mut cache = lock(&self.issue_cache);
        if let Some(entry) = cache.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
            // Expired, drop it and re-fetch
            cache.pop(key);
        }
        None
    }

    fn failed(&self, error: ResolveError) -> Resolution {
        lock(&self.circuit).record_failure();
        Resolution::Failed(error)
    }

    /// Fetch an issue or pull request summary.
    pub async fn fetch_issue(&self, owner: &str, repo: &str, number: u64) -> Resolution {
        let key = format!("{owner}/{repo}/{number}");

        if let Some(summary) = self.cached(&key) {
            debug!(issue = %key, "GitHub issue cache hit");
            return Resolution::Resolved(summary);
        }

        if !lock(&self.circuit).allow_request() {
            debug!("GitHub circuit breaker open, skipping issue fetch");
            return Resolution::Failed(ResolveError::CircuitOpen);
        }

        let url = format!("{}/repos/{owner}/{repo}/issues/{number}", self.api_base);
        let resp = match self.request(&url).send().await {
            Ok(resp) => resp,
            Err(e) => return self.failed(ResolveError::Http(e)),
        };

        match resp.status() {
            status if status.is_success() => {
                lock(&self.circuit).record_success();
                match resp.json::<IssueInfo>().await {
                    Ok(info) => {
                        let summary = IssueSummary::new(info.html_url, info.title);
                        lock(&self.issue_cache).put(key, CacheEntry::new(summary.clone()));
                        Resolution::Resolved(summary)
                    }
                    Err(e) => Resolution::Failed(ResolveError::Malformed(e.to_string())),
                }
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                lock(&self.circuit).record_success();
                Resolution::Absent
            }
            StatusCode::UNAUTHORIZED => self.failed(ResolveError::Unauthorized),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                self.failed(ResolveError::RateLimited)
            }
            status => self.failed(ResolveError::Status(status.as_u16())),
        }
    }
}

#[async_trait]
impl IssueLookup for GitHubClient {
    async fn fetch_issue(&self, reference: &IssueReference) -> Resolution {
        GitHubClient::fetch_issue(self, &reference.owner, &reference.repo, reference.number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_circuit_breaker_allows_initially() {
        let mut cb = CircuitBreaker::new();
        assert!(cb.allow_request());
    }

    fn past_cooldown() -> Instant {
        Instant::now()
            .checked_sub(CIRCUIT_BREAKER_COOLDOWN + Duration::from_secs(1))
            .unwrap()
    }

    fn open_breaker() -> CircuitBreaker {
        let mut cb = CircuitBreaker::new();
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD {
            cb.record_failure();
        }
        cb
    }

    #[test]
    fn test_circuit_breaker_half_open_allows_one_trial() {
        let mut cb = open_breaker();
        cb.opened_at = Some(past_cooldown());

        assert!(cb.allow_request());
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_circuit_breaker_failed_trial_reopens() {
        let mut cb = open_breaker();
        cb.opened_at = Some(past_cooldown());
        assert!(cb.allow_request());

        cb.record_failure();
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_circuit_breaker_successful_trial_closes() {
        let mut cb = open_breaker();
        cb.opened_at = Some(past_cooldown());
        assert!(cb.allow_request());

        cb.record_success();
        assert!(cb.allow_request());
        assert!(cb.allow_request());
    }

    #[test]
    fn test_circuit_breaker_abandoned_trial_frees_slot() {
        let mut cb = open_breaker();
        cb.opened_at = Some(past_cooldown());
        cb.trial_started = Some(past_cooldown());

        assert!(cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_circuit_breaker_opens_after_threshold() {
        let mut cb = CircuitBreaker::new();
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD {
            cb.record_failure();
        }
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_circuit_breaker_resets_on_success() {
        let mut cb = CircuitBreaker::new();
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD - 1 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.consecutive_failures, 0);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_empty_token_is_unauthenticated() {
        let client = GitHubClient::new(Some(String::new())).unwrap();
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_fetch_issue_success_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/Hello-World/issues/1"))
            .and(header("Accept", "application/vnd.github.v3+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "number": 1,
                "html_url": "https://github.com/octocat/Hello-World/issues/1",
                "title": "Found a bug",
                "state": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::with_api_base(server.uri(), None).unwrap();
        for _ in 0..2 {
            match client.fetch_issue("octocat", "Hello-World", 1).await {
                Resolution::Resolved(summary) => {
                    assert_eq!(summary.title, "Found a bug");
                    assert_eq!(
                        summary.url,
                        "https://github.com/octocat/Hello-World/issues/1"
                    );
                }
                other => panic!("expected resolved, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_issue_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/2"))
            .and(header("Authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html_url": "https://github.com/o/r/pull/2",
                "title": "Add feature"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::with_api_base(server.uri(), Some("ghp_test".into())).unwrap();
        assert!(matches!(
            client.fetch_issue("o", "r", 2).await,
            Resolution::Resolved(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_issue_not_found_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::with_api_base(server.uri(), None).unwrap();
        assert!(matches!(
            client.fetch_issue("o", "r", 9).await,
            Resolution::Absent
        ));
        assert_eq!(lock(&client.circuit).consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_fetch_issue_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/2"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = GitHubClient::with_api_base(server.uri(), None).unwrap();
        assert!(matches!(
            client.fetch_issue("o", "r", 1).await,
            Resolution::Failed(ResolveError::Unauthorized)
        ));
        assert!(matches!(
            client.fetch_issue("o", "r", 2).await,
            Resolution::Failed(ResolveError::RateLimited)
        ));
        assert!(matches!(
            client.fetch_issue("o", "r", 3).await,
            Resolution::Failed(ResolveError::Status(500))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = GitHubClient::with_api_base(server.uri(), None).unwrap();
        assert!(matches!(
            client.fetch_issue("o", "r", 1).await,
            Resolution::Failed(ResolveError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(u64::from(CIRCUIT_BREAKER_THRESHOLD))
            .mount(&server)
            .await;

        let client = GitHubClient::with_api_base(server.uri(), None).unwrap();
        for n in 0..CIRCUIT_BREAKER_THRESHOLD {
            client.fetch_issue("o", "r", u64::from(n)).await;
        }
        assert!(matches!(
            client.fetch_issue("o", "r", 100).await,
            Resolution::Failed(ResolveError::CircuitOpen)
        ));
    }
}
