use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::{
    error::AuthError,
    management::session::SessionTokens,
    types::HttpReply,
};

/// Transport seam for the Spotify Web API. Tests script replies instead of
/// talking to the network.
pub trait WebApi: Send + Sync {
    fn get(
        &self,
        path_and_query: String,
        bearer: String,
    ) -> impl Future<Output = Result<HttpReply, AuthError>> + Send;
}

/// [`WebApi`] over HTTP against a base URL.
#[derive(Clone)]
pub struct HttpWebApi {
    client: Client,
    base_url: String,
}

impl HttpWebApi {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpWebApi {
            client,
            base_url: base_url.to_string(),
        }
    }
}

impl WebApi for HttpWebApi {
    async fn get(&self, path_and_query: String, bearer: String) -> Result<HttpReply, AuthError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path_and_query))
            .header("Authorization", format!("Bearer {}", bearer))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpReply { status, body })
    }
}

/// Retry policy for transient API failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Delay before retry `k` (1-based): base doubled per prior retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Immutable per-call bookkeeping, passed by value so each decision point
/// sees exactly the state it derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallAttemptState {
    pub retry_count: u32,
    pub refresh_attempted: bool,
}

impl CallAttemptState {
    pub fn next_retry(self) -> Self {
        CallAttemptState {
            retry_count: self.retry_count + 1,
            ..self
        }
    }

    pub fn with_refresh_attempted(self) -> Self {
        CallAttemptState {
            refresh_attempted: true,
            ..self
        }
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// API client wrapping every call with the session's token supply, a
/// single 401-triggered refresh retry and bounded exponential backoff for
/// transient failures.
pub struct SpotifyClient<A: WebApi, S: SessionTokens> {
    api: A,
    tokens: S,
    retry: RetryConfig,
}

impl<A: WebApi, S: SessionTokens> SpotifyClient<A, S> {
    pub fn new(api: A, tokens: S) -> Self {
        SpotifyClient {
            api,
            tokens,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Performs a GET and decodes the JSON body.
    ///
    /// On 401 the session is refreshed and the call replayed once; a second
    /// 401 is final. 429 and 5xx back off exponentially up to the retry
    /// cap. Any other non-2xx status fails immediately.
    pub async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, AuthError> {
        let reply = self.call(path_and_query).await?;
        let value = serde_json::from_str(&reply.body)?;
        Ok(value)
    }

    /// Same as [`get_json`](Self::get_json) but treats a 403 as an empty
    /// default. Some endpoints are gated on scopes older grants lack, and
    /// a missing scope should read as "nothing here", not as a failure.
    pub async fn get_json_or_default<T: DeserializeOwned + Default>(
        &self,
        path_and_query: &str,
    ) -> Result<T, AuthError> {
        match self.call(path_and_query).await {
            Ok(reply) => Ok(serde_json::from_str(&reply.body)?),
            Err(AuthError::Api { status: 403, .. }) => Ok(T::default()),
            Err(e) => Err(e),
        }
    }

    async fn call(&self, path_and_query: &str) -> Result<HttpReply, AuthError> {
        let mut bearer = self.tokens.current().await?;
        let mut attempt = CallAttemptState::default();

        loop {
            let result = self
                .api
                .get(path_and_query.to_string(), bearer.clone())
                .await;

            match result {
                Ok(reply) if reply.is_success() => return Ok(reply),
                Ok(reply) if reply.status == 401 => {
                    if attempt.refresh_attempted {
                        return Err(AuthError::Unauthorized);
                    }
                    attempt = attempt.with_refresh_attempted();
                    bearer = self.tokens.refreshed().await?;
                }
                Ok(reply) if is_transient(reply.status) => {
                    if attempt.retry_count >= self.retry.max_retries {
                        return if reply.status == 429 {
                            Err(AuthError::RateLimited)
                        } else {
                            Err(AuthError::ServiceUnavailable)
                        };
                    }
                    attempt = attempt.next_retry();
                    tokio::time::sleep(self.retry.delay_for(attempt.retry_count)).await;
                }
                Ok(reply) => {
                    return Err(AuthError::Api {
                        status: reply.status,
                        body: reply.body,
                    });
                }
                // transport errors back off the same way transient
                // statuses do
                Err(AuthError::Http(_)) => {
                    if attempt.retry_count >= self.retry.max_retries {
                        return Err(AuthError::ServiceUnavailable);
                    }
                    attempt = attempt.next_retry();
                    tokio::time::sleep(self.retry.delay_for(attempt.retry_count)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
