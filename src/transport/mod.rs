//! Authenticated GraphQL requests with centralized retry and backoff.

mod error;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::GraphqlRequest;
use crate::auth::AuthProvider;
use crate::http_client::HttpFetch;
use crate::query_ids::QueryIdResolver;
use crate::rate_limit::{backoff_delay, parse_retry_after};

/// Retry budget shared by rate-limit and network retries.
///
/// The two kinds of failure are counted separately, each up to
/// `max_retries`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// A successful response plus how many 429s it took to get it.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Value,
    pub rate_limit_hits: u32,
}

/// Executes GraphQL requests against the upstream API.
pub struct RateLimitedTransport {
    http: Arc<dyn HttpFetch>,
    auth: Arc<dyn AuthProvider>,
    resolver: Arc<QueryIdResolver>,
    policy: RetryPolicy,
}

impl RateLimitedTransport {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        auth: Arc<dyn AuthProvider>,
        resolver: Arc<QueryIdResolver>,
    ) -> Self {
        Self {
            http,
            auth,
            resolver,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resolver(&self) -> &Arc<QueryIdResolver> {
        &self.resolver
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Execute a request, retrying transient failures.
    pub async fn execute(&self, request: &GraphqlRequest) -> Result<ApiResponse, ApiError> {
        let operation = request.operation.name();
        let mut query_id = self.resolver.resolve(operation).await?;
        let mut refreshed = false;
        let mut rate_limit_attempts = 0u32;
        let mut network_attempts = 0u32;

        loop {
            let credentials = self.auth.credentials().await?;
            let url = request.url(&query_id)?;
            let headers = credentials.request_headers();

            let response = match self.http.get(url.as_str(), &headers).await {
                Ok(response) => response,
                Err(err) => {
                    if network_attempts >= self.policy.max_retries {
                        return Err(ApiError::TransientNetwork {
                            operation: operation.to_string(),
                            attempts: network_attempts,
                            message: err.to_string(),
                        });
                    }
                    let delay = backoff_delay(network_attempts, self.policy.base_delay);
                    network_attempts += 1;
                    warn!("{} failed ({}), retrying in {:?}", operation, err, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match response.status {
                200..=299 => {
                    let body = response.parse_json().map_err(|e| ApiError::InvalidResponse {
                        operation: operation.to_string(),
                        reason: e.to_string(),
                    })?;
                    debug!("{} succeeded", operation);
                    return Ok(ApiResponse {
                        body,
                        rate_limit_hits: rate_limit_attempts,
                    });
                }
                429 => {
                    if rate_limit_attempts >= self.policy.max_retries {
                        return Err(ApiError::RateLimitExceeded {
                            attempts: rate_limit_attempts,
                        });
                    }
                    let backoff = backoff_delay(rate_limit_attempts, self.policy.base_delay);
                    let delay = parse_retry_after(response.header("retry-after"))
                        .map_or(backoff, |hint| hint.max(backoff));
                    rate_limit_attempts += 1;
                    warn!(
                        "Rate limited on {} (attempt {}), backing off {:?}",
                        operation, rate_limit_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                404 => {
                    if refreshed {
                        return Err(ApiError::StaleQueryId {
                            operation: operation.to_string(),
                        });
                    }
                    info!("{} returned 404, refreshing identifiers", operation);
                    refreshed = true;
                    self.resolver.refresh().await;
                    query_id = self.resolver.resolve(operation).await?;
                }
                401 => {
                    return Err(ApiError::CredentialsExpired(format!(
                        "upstream returned 401 for {}",
                        operation
                    )));
                }
                403 => {
                    warn!("{} forbidden, stopping", operation);
                    return Err(ApiError::Forbidden {
                        operation: operation.to_string(),
                    });
                }
                500..=599 => {
                    if network_attempts >= self.policy.max_retries {
                        return Err(ApiError::TransientNetwork {
                            operation: operation.to_string(),
                            attempts: network_attempts,
                            message: format!("HTTP {}", response.status),
                        });
                    }
                    let delay = backoff_delay(network_attempts, self.policy.base_delay);
                    network_attempts += 1;
                    warn!(
                        "{} returned HTTP {}, retrying in {:?}",
                        operation, response.status, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                status => {
                    return Err(ApiError::Http {
                        operation: operation.to_string(),
                        status,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::timeline_request;
    use crate::auth::{AuthError, Credentials, StaticCredentials};
    use crate::http_client::mock::ScriptedFetch;
    use crate::http_client::{FetchError, HttpResponse};
    use crate::models::CollectionKind;
    use crate::query_ids::tests::FixedDiscovery;
    use crate::query_ids::{fallback_query_id, QueryIdCache};
    use async_trait::async_trait;
    use serde_json::json;

    pub fn credentials() -> Arc<dyn AuthProvider> {
        Arc::new(StaticCredentials::new(Credentials::new("tok", "csrf", "42")))
    }

    /// Transport over a scripted fake with zero backoff.
    pub fn transport_with(
        http: Arc<ScriptedFetch>,
        discovery: Arc<FixedDiscovery>,
    ) -> RateLimitedTransport {
        let resolver = Arc::new(QueryIdResolver::new(QueryIdCache::in_memory(), discovery));
        RateLimitedTransport::new(http, credentials(), resolver).with_policy(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::ZERO,
        })
    }

    fn likes() -> GraphqlRequest {
        timeline_request(CollectionKind::Likes, "42", None, None)
    }

    #[tokio::test]
    async fn test_success_sends_auth_headers() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json("/Likes", 200, json!({"ok": true}));
        let transport = transport_with(http.clone(), Arc::new(FixedDiscovery::new(&[])));

        let response = transport.execute(&likes()).await.unwrap();
        assert_eq!(response.body["ok"], true);
        assert_eq!(response.rate_limit_hits, 0);

        let headers = http.last_headers();
        assert!(headers.iter().any(|(k, v)| k == "x-csrf-token" && v == "csrf"));
        let expected = format!("/{}/Likes", fallback_query_id("Likes").unwrap());
        assert!(http.urls()[0].contains(&expected));
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_succeeds() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/Likes", 429)
            .on_status("/Likes", 429)
            .on_json("/Likes", 200, json!({}));
        let transport = transport_with(http.clone(), Arc::new(FixedDiscovery::new(&[])));

        let response = transport.execute(&likes()).await.unwrap();
        assert_eq!(response.rate_limit_hits, 2);
        assert_eq!(http.count("/Likes"), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_budget_exhausted() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/Likes", 429);
        let transport = transport_with(http.clone(), Arc::new(FixedDiscovery::new(&[])));

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimitExceeded { attempts: 3 }));
        assert_eq!(http.count("/Likes"), 4);
    }

    #[tokio::test]
    async fn test_not_found_refreshes_once() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/Likes", 404).on_json("/Likes", 200, json!({}));
        let discovery = Arc::new(FixedDiscovery::new(&[("Likes", "NewLikesId")]));
        let transport = transport_with(http.clone(), discovery.clone());

        transport.execute(&likes()).await.unwrap();
        assert_eq!(discovery.calls(), 1);
        assert!(http.urls()[1].contains("/NewLikesId/Likes"));
    }

    #[tokio::test]
    async fn test_second_not_found_is_fatal() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/Likes", 404);
        let discovery = Arc::new(FixedDiscovery::new(&[]));
        let transport = transport_with(http.clone(), discovery.clone());

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(matches!(err, ApiError::StaleQueryId { .. }));
        assert_eq!(discovery.calls(), 1);
        assert_eq!(http.count("/Likes"), 2);
    }

    #[tokio::test]
    async fn test_forbidden_not_retried() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/Likes", 403);
        let transport = transport_with(http.clone(), Arc::new(FixedDiscovery::new(&[])));

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(err.halts_run());
        assert_eq!(http.count("/Likes"), 1);
    }

    #[tokio::test]
    async fn test_network_errors_counted_separately() {
        let http = Arc::new(ScriptedFetch::new());
        http.on("/Likes", Err(FetchError::Timeout("slow".to_string())))
            .on_status("/Likes", 429)
            .on("/Likes", Err(FetchError::Connect("reset".to_string())))
            .on_status("/Likes", 503)
            .on_json("/Likes", 200, json!({}));
        let transport = transport_with(http.clone(), Arc::new(FixedDiscovery::new(&[])));

        let response = transport.execute(&likes()).await.unwrap();
        assert_eq!(response.rate_limit_hits, 1);
        assert_eq!(http.count("/Likes"), 5);
    }

    #[tokio::test]
    async fn test_network_budget_exhausted() {
        let http = Arc::new(ScriptedFetch::new());
        http.on("/Likes", Err(FetchError::Connect("down".to_string())));
        let transport = transport_with(http.clone(), Arc::new(FixedDiscovery::new(&[])));

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(matches!(err, ApiError::TransientNetwork { attempts: 3, .. }));
        assert!(err.is_retryable_later());
    }

    #[tokio::test]
    async fn test_unauthorized_is_credentials_expired() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/Likes", 401);
        let transport = transport_with(http, Arc::new(FixedDiscovery::new(&[])));

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(matches!(err, ApiError::CredentialsExpired(_)));
    }

    struct ExpiredAuth;

    #[async_trait]
    impl AuthProvider for ExpiredAuth {
        async fn credentials(&self) -> Result<Credentials, AuthError> {
            Err(AuthError::CredentialsExpired("cookie gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_auth_failure_sends_nothing() {
        let http = Arc::new(ScriptedFetch::new());
        let resolver = Arc::new(QueryIdResolver::new(
            QueryIdCache::in_memory(),
            Arc::new(FixedDiscovery::new(&[])),
        ));
        let transport = RateLimitedTransport::new(http.clone(), Arc::new(ExpiredAuth), resolver);

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(matches!(err, ApiError::CredentialsExpired(_)));
        assert!(http.urls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let http = Arc::new(ScriptedFetch::new());
        http.on("/Likes", Ok(HttpResponse::new(200, "<html>")));
        let transport = transport_with(http, Arc::new(FixedDiscovery::new(&[])));

        let err = transport.execute(&likes()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { .. }));
    }
}
