//! Account directory client.
//!
//! Tokens are opaque bearer credentials validated against an external
//! account service over HTTP. The trait seam exists so the dispatch layer
//! and the tests can run against an in-memory directory instead of a live
//! service.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use serde::Deserialize;

/// Public profile of a registered account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub level: i32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Resolve a bearer token to the username it was issued for. `None`
    /// means the token is invalid, expired, or the service rejected it.
    async fn authenticate(&self, token: &str) -> Option<String>;

    /// Look up a registered account by username.
    async fn user_info(&self, username: &str) -> Option<UserInfo>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// [`AuthClient`] backed by the external account service's HTTP API.
pub struct HttpAuthClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct VerifyResponse {
    username: String,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn authenticate(&self, token: &str) -> Option<String> {
        let url = format!("{}/auth/verify", self.base_url);
        let response = match self.client.get(&url).query(&[("token", token)]).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Token verification request failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!("Token rejected by account service: {}", response.status());
            return None;
        }
        response
            .json::<VerifyResponse>()
            .await
            .ok()
            .map(|v| v.username)
    }

    async fn user_info(&self, username: &str) -> Option<UserInfo> {
        let url = format!("{}/users/{}", self.base_url, username);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Account lookup request failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        response.json::<UserInfo>().await.ok()
    }
}

/// In-memory [`AuthClient`] with a fixed token and account table. Used by
/// the integration tests; also handy for local runs without an account
/// service.
#[derive(Default)]
pub struct StaticAuthClient {
    tokens: HashMap<String, String>,
    accounts: HashMap<String, i32>,
}

impl StaticAuthClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and the token that authenticates as it.
    pub fn with_user(mut self, token: &str, username: &str, level: i32) -> Self {
        self.tokens.insert(token.to_string(), username.to_string());
        self.accounts.insert(username.to_string(), level);
        self
    }
}

#[async_trait]
impl AuthClient for StaticAuthClient {
    async fn authenticate(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }

    async fn user_info(&self, username: &str) -> Option<UserInfo> {
        self.accounts.get(username).map(|&level| UserInfo {
            username: username.to_string(),
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extracts_credential() {
        // given:
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok-123"),
        );

        // when / then:
        assert_eq!(bearer_token(&headers), Some("tok-123"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes_and_absence() {
        // given:
        let mut basic = HeaderMap::new();
        basic.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        let empty = HeaderMap::new();

        // when / then:
        assert_eq!(bearer_token(&basic), None);
        assert_eq!(bearer_token(&empty), None);
    }

    #[tokio::test]
    async fn test_static_client_resolves_known_token() {
        // given:
        let auth = StaticAuthClient::new().with_user("tok-a", "alice", 5);

        // when / then:
        assert_eq!(auth.authenticate("tok-a").await, Some("alice".to_string()));
        assert_eq!(auth.authenticate("tok-x").await, None);
    }

    #[tokio::test]
    async fn test_static_client_looks_up_accounts() {
        // given:
        let auth = StaticAuthClient::new().with_user("tok-a", "alice", 5);

        // when:
        let info = auth.user_info("alice").await;

        // then:
        assert_eq!(
            info,
            Some(UserInfo {
                username: "alice".to_string(),
                level: 5,
            })
        );
        assert_eq!(auth.user_info("bob").await, None);
    }

    #[tokio::test]
    async fn test_mock_client_can_stub_authentication() {
        // given:
        let mut auth = MockAuthClient::new();
        auth.expect_authenticate()
            .withf(|token| token == "tok-a")
            .returning(|_| Some("alice".to_string()));

        // when / then:
        assert_eq!(auth.authenticate("tok-a").await, Some("alice".to_string()));
    }
}
