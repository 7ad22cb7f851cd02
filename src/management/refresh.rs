use std::time::Duration;

use reqwest::Client;

use crate::{
    error::AuthError,
    types::{HttpReply, RefreshCredential, TokenResponse},
    utils,
};

/// Transport seam for the authorization server's token endpoint.
///
/// The production implementation posts a form with confidential-client
/// basic auth; tests substitute a scripted endpoint.
pub trait TokenEndpoint: Send + Sync {
    fn post_form(
        &self,
        form: Vec<(String, String)>,
    ) -> impl Future<Output = Result<HttpReply, AuthError>> + Send;
}

/// Token endpoint reached over HTTP with a bounded timeout.
#[derive(Clone)]
pub struct HttpTokenEndpoint {
    client: Client,
    token_url: String,
    // precomputed base64(client_id:client_secret); transmitted only in the
    // Authorization header, never in the form body
    basic: String,
}

impl HttpTokenEndpoint {
    pub fn new(client: Client, token_url: &str, client_id: &str, client_secret: &str) -> Self {
        HttpTokenEndpoint {
            client,
            token_url: token_url.to_string(),
            basic: utils::basic_auth(client_id, client_secret),
        }
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    async fn post_form(&self, form: Vec<(String, String)>) -> Result<HttpReply, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", self.basic))
            .form(&form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpReply { status, body })
    }
}

/// Builds an HTTP client with the bounded timeout used for all calls to the
/// authorization server and the Spotify Web API.
pub fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Exchanges credentials with the authorization server.
///
/// Performs exactly one request per invocation; retry policy belongs to the
/// caller. A failed refresh surfaces immediately as an error state for the
/// reconnect flow to handle.
pub struct TokenRefresher<E: TokenEndpoint> {
    endpoint: E,
}

impl<E: TokenEndpoint> TokenRefresher<E> {
    pub fn new(endpoint: E) -> Self {
        TokenRefresher { endpoint }
    }

    /// Exchanges a refresh credential for a new access credential.
    ///
    /// Fails fast with `NoRefreshToken` when no credential is available,
    /// without attempting network I/O. A response lacking `refresh_token`
    /// is valid: the previous refresh credential stays in force.
    pub async fn refresh(
        &self,
        refresh: Option<&RefreshCredential>,
    ) -> Result<TokenResponse, AuthError> {
        let Some(refresh) = refresh else {
            return Err(AuthError::NoRefreshToken);
        };

        let form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh.0.clone()),
        ];

        let reply = match self.endpoint.post_form(form).await {
            Ok(reply) => reply,
            // timeouts and connect errors count the same as a rejection
            Err(e) => {
                return Err(AuthError::RefreshFailed {
                    status: 0,
                    body: e.to_string(),
                });
            }
        };

        if !reply.is_success() {
            return Err(AuthError::RefreshFailed {
                status: reply.status,
                body: reply.body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&reply.body).map_err(|e| AuthError::RefreshFailed {
                status: reply.status,
                body: format!("malformed token response: {e}"),
            })?;
        Ok(token)
    }

    /// Exchanges an authorization code for the initial token pair
    /// (the fresh sign-in path).
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
        ];

        let reply = self.endpoint.post_form(form).await?;
        if !reply.is_success() {
            return Err(AuthError::Api {
                status: reply.status,
                body: reply.body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&reply.body)?;
        Ok(token)
    }
}
