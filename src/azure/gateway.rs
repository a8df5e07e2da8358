//! Signed REST calls against Graph, the PIM Governance API and ARM.
//!
//! Every request gets a fresh bearer token for its audience, HTTP 429 is
//! retried with exponential backoff, and list endpoints are followed through
//! their continuation links.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::models::Tenant;
use crate::auth::{Audience, TokenCredential};
use crate::error::ApiError;

/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single request, and separately for acquiring its token.
/// Fetches additionally run under a whole-call timeout set by the caller.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the three APIs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub graph: String,
    pub pim: String,
    pub arm: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            graph: "https://graph.microsoft.com/v1.0".to_string(),
            pim: "https://api.azrbac.mspim.azure.com/api/v2/privilegedAccess".to_string(),
            arm: "https://management.azure.com".to_string(),
        }
    }
}

/// Backoff for rate-limited requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// HTTP gateway shared by all Azure services.
pub struct RestGateway {
    http: Client,
    credential: Arc<dyn TokenCredential>,
    endpoints: Endpoints,
    retry: RetryPolicy,
    request_timeout: Duration,
    pub(super) user_id: OnceCell<String>,
    pub(super) tenant: OnceCell<Tenant>,
}

impl RestGateway {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Result<Self, ApiError> {
        Self::with_endpoints(credential, Endpoints::default(), RetryPolicy::default())
    }

    pub fn with_endpoints(
        credential: Arc<dyn TokenCredential>,
        endpoints: Endpoints,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            credential,
            endpoints,
            retry,
            request_timeout: HTTP_REQUEST_TIMEOUT,
            user_id: OnceCell::new(),
            tenant: OnceCell::new(),
        })
    }

    /// Replace the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn credential(&self) -> &Arc<dyn TokenCredential> {
        &self.credential
    }

    /// Send one request and return the raw response body.
    ///
    /// 429 responses are retried per the [`RetryPolicy`]; any other status
    /// of 400 or above fails immediately. A request that outlives the
    /// per-request timeout fails with [`ApiError::Timeout`] and is not retried.
    pub async fn call(
        &self,
        audience: Audience,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Vec<u8>, ApiError> {
        let token = tokio::time::timeout(self.request_timeout, self.credential.get_token(audience))
            .await
            .map_err(|_| self.timed_out(&method, url))??;
        let attempts = self.retry.max_attempts();

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.retry.delay(attempt - 1);
                debug!("Rate limited, retrying {} {} in {:?}", method, url, delay);
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .http
                .request(method.clone(), url)
                .bearer_auth(token.token.expose())
                .header("Content-Type", "application/json")
                .timeout(self.request_timeout);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| self.transport_error(e, &method, url))?;
            let status = response.status().as_u16();

            if status == 429 {
                continue;
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| self.transport_error(e, &method, url))?;
            if status >= 400 {
                let body = String::from_utf8_lossy(&bytes).into_owned();
                warn!("{} {} failed: HTTP {}", method, url, status);
                return Err(ApiError::Status { status, body });
            }

            return Ok(bytes.to_vec());
        }

        warn!("{} {} still rate limited after {} attempts", method, url, attempts);
        Err(ApiError::RateLimitExhausted { attempts })
    }

    fn transport_error(&self, err: reqwest::Error, method: &Method, url: &str) -> ApiError {
        if err.is_timeout() {
            self.timed_out(method, url)
        } else {
            err.into()
        }
    }

    fn timed_out(&self, method: &Method, url: &str) -> ApiError {
        warn!("{} {} timed out after {:?}", method, url, self.request_timeout);
        ApiError::Timeout(self.request_timeout.as_secs())
    }

    /// GET and deserialize a JSON document.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        audience: Audience,
        url: &str,
    ) -> Result<T, ApiError> {
        let bytes = self.call(audience, Method::GET, url, None).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET every page of a list endpoint and concatenate the `value` arrays.
    ///
    /// Follows `@odata.nextLink` (Graph, PIM) and `nextLink` (ARM).
    pub async fn get_all_pages(
        &self,
        audience: Audience,
        url: &str,
    ) -> Result<Vec<Value>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            let mut page: Value = self.get_json(audience, &page_url).await?;
            pages += 1;

            match page.get_mut("value").map(Value::take) {
                Some(Value::Array(values)) => items.extend(values),
                Some(Value::Null) | None => {}
                Some(_) => return Err(ApiError::Parse("'value' is not an array".into())),
            }

            next = page
                .get("@odata.nextLink")
                .or_else(|| page.get("nextLink"))
                .and_then(Value::as_str)
                .filter(|link| !link.is_empty())
                .map(str::to_string);
        }

        debug!("Fetched {} items in {} page(s) from {}", items.len(), pages, url);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredential;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn gateway(server: &MockServer) -> RestGateway {
        let endpoints = Endpoints {
            graph: format!("{}/graph", server.uri()),
            pim: format!("{}/pim", server.uri()),
            arm: server.uri(),
        };
        RestGateway::with_endpoints(Arc::new(StaticCredential), endpoints, fast_retry()).unwrap()
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test]
    async fn test_call_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let body = gw
            .call(Audience::Graph, Method::GET, &format!("{}/thing", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_retries_429_then_succeeds() {
        for k in 1..=3u64 {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(429))
                .up_to_n_times(k)
                .expect(k)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
                .expect(1)
                .mount(&server)
                .await;

            let gw = gateway(&server);
            let result = gw
                .call(Audience::Pim, Method::GET, &format!("{}/x", server.uri()), None)
                .await;
            assert!(result.is_ok(), "k = {}", k);
            assert_eq!(server.received_requests().await.unwrap().len() as u64, k + 1);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted_after_four_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let err = gw
            .call(Audience::Pim, Method::GET, &format!("{}/x", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimitExhausted { attempts: 4 }));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let body = serde_json::json!({"a": 1});
        let err = gw
            .call(
                Audience::Pim,
                Method::POST,
                &format!("{}/x", server.uri()),
                Some(&body),
            )
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_request_times_out_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server).with_request_timeout(Duration::from_millis(100));
        let body = serde_json::json!({"reason": "deploy"});
        let err = gw
            .call(
                Audience::Pim,
                Method::POST,
                &format!("{}/x", server.uri()),
                Some(&body),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_get_all_pages_follows_both_link_styles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"n": 2}],
                "nextLink": format!("{}/list?page=3", server.uri())
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"n": 3}, {"n": 4}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"n": 1}],
                "@odata.nextLink": format!("{}/list?page=2", server.uri())
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let items = gw
            .get_all_pages(Audience::Graph, &format!("{}/list", server.uri()))
            .await
            .unwrap();
        let numbers: Vec<i64> = items.iter().filter_map(|v| v["n"].as_i64()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }
}
