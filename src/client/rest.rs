//! REST client for the hosted registry platform
//!
//! Auth lives under `/auth/v1`, tables under `/rest/v1/<table>` with
//! `column=eq.value` filters.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::api::{AuthApi, DataApi};
use super::jwt;
use super::models::{AuthSession, ListQuery, Mutation, Profile, Resource};
use crate::error::{ApiError, Result};

/// Rate limit: 10 requests per second
const RATE_LIMIT_PER_SECOND: u32 = 10;

/// Registry platform REST client
pub struct RestClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    access_token: RwLock<Option<String>>,
}

/// Token endpoint response
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = jwt::expires_at(&self.access_token).unwrap_or_else(|_| {
            Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600))
        });
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user_id: self.user.id,
            email: self.user.email,
        }
    }
}

impl RestClient {
    /// Create a client for the platform at `api_url`
    pub fn new(api_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            http,
            base_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            access_token: RwLock::new(None),
        })
    }

    async fn bearer(&self) -> Option<String> {
        let token = self.access_token.read().await;
        token.clone().or_else(|| self.api_key.clone())
    }

    /// Make a request and parse the JSON body (`None` for empty bodies)
    async fn request_inner(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        bearer: Option<String>,
    ) -> Result<Option<Value>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method.clone(), &url).query(query);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key);
        }
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request
                .header("Prefer", "return=representation")
                .json(body);
        }

        let response = request.send().await.map_err(ApiError::from)?;

        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                let text = response.text().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to read response: {}", e))
                })?;
                if text.trim().is_empty() {
                    return Ok(None);
                }
                let data = serde_json::from_str(&text).map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(Some(data))
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized.into()),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden.into()),
            StatusCode::NOT_FOUND => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Resource not found".to_string());
                Err(ApiError::NotFound(error_msg).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Bad request".to_string());
                Err(ApiError::BadRequest(error_msg).into())
            }
            status if status.is_server_error() => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Server error: {}", status));
                Err(ApiError::ServerError(error_msg).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<AuthSession> {
        let query = [("grant_type".to_string(), grant_type.to_string())];
        let result = self
            .request_inner(
                Method::POST,
                "/auth/v1/token",
                &query,
                Some(&body),
                self.api_key.clone(),
            )
            .await;

        let value = match result {
            Ok(Some(value)) => value,
            Ok(None) => {
                return Err(ApiError::InvalidResponse("Empty token response".to_string()).into());
            }
            // The auth service reports bad credentials as 400 invalid_grant
            Err(crate::error::Error::Api(ApiError::BadRequest(_))) => {
                return Err(ApiError::Unauthorized.into());
            }
            Err(e) => return Err(e),
        };

        let token: TokenResponse = serde_json::from_value(value).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse token response: {}", e))
        })?;
        Ok(token.into_session())
    }

    async fn rows(
        &self,
        method: Method,
        resource: Resource,
        query: Vec<(String, String)>,
        body: Option<&Value>,
    ) -> Result<Vec<Value>> {
        let path = format!("/rest/v1/{}", resource.table());
        let bearer = self.bearer().await;
        match self
            .request_inner(method, &path, &query, body, bearer)
            .await?
        {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Ok(vec![other]),
            None => Ok(Vec::new()),
        }
    }
}

fn eq_filter(column: &str, value: &str) -> (String, String) {
    (column.to_string(), format!("eq.{}", value))
}

#[async_trait]
impl AuthApi for RestClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.token_request("password", json!({"email": email, "password": password}))
            .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.token_request("refresh_token", json!({"refresh_token": refresh_token}))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.request_inner(
            Method::POST,
            "/auth/v1/logout",
            &[],
            None,
            Some(access_token.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Profile> {
        let rows = self
            .rows(
                Method::GET,
                Resource::Users,
                vec![("select".to_string(), "*".to_string()), eq_filter("id", user_id)],
                None,
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("profile {}", user_id)))?;
        let profile = serde_json::from_value(row).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse profile: {}", e))
        })?;
        Ok(profile)
    }

    async fn set_access_token(&self, token: Option<String>) {
        let mut current = self.access_token.write().await;
        *current = token;
    }
}

#[async_trait]
impl DataApi for RestClient {
    async fn list(&self, resource: Resource, query: &ListQuery) -> Result<Vec<Value>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query.filters.iter().map(|(k, v)| eq_filter(k, v)));
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        self.rows(Method::GET, resource, params, None).await
    }

    async fn get(&self, resource: Resource, id: &str) -> Result<Value> {
        let rows = self
            .rows(
                Method::GET,
                resource,
                vec![("select".to_string(), "*".to_string()), eq_filter("id", id)],
                None,
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", resource, id)).into())
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<Value> {
        let rows = match mutation {
            Mutation::Create { resource, data } => {
                self.rows(Method::POST, *resource, Vec::new(), Some(data))
                    .await?
            }
            Mutation::Update { resource, id, data } => {
                self.rows(Method::PATCH, *resource, vec![eq_filter("id", id)], Some(data))
                    .await?
            }
            Mutation::Delete { resource, id } => {
                self.rows(Method::DELETE, *resource, vec![eq_filter("id", id)], None)
                    .await?;
                return Ok(Value::Null);
            }
        };
        Ok(rows.into_iter().next().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RestClient::new(
            "https://registry.example/",
            Some("anon".to_string()),
            Duration::from_secs(15),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://registry.example");
    }

    #[tokio::test]
    async fn test_bearer_prefers_session_token() {
        let client =
            RestClient::new("http://localhost", Some("anon".to_string()), Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.bearer().await.as_deref(), Some("anon"));

        client.set_access_token(Some("user-token".to_string())).await;
        assert_eq!(client.bearer().await.as_deref(), Some("user-token"));

        client.set_access_token(None).await;
        assert_eq!(client.bearer().await.as_deref(), Some("anon"));
    }

    #[test]
    fn test_token_response_expiry_from_jwt() {
        let token = jwt::encode_test_token(1_900_000_000, "u-1");
        let response = TokenResponse {
            access_token: token,
            refresh_token: "r".to_string(),
            expires_in: Some(10),
            user: TokenUser {
                id: "u-1".to_string(),
                email: Some("a@b.c".to_string()),
            },
        };
        let session = response.into_session();
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(session.user_id, "u-1");
    }

    #[test]
    fn test_token_response_expiry_fallback() {
        let response = TokenResponse {
            access_token: "opaque".to_string(),
            refresh_token: "r".to_string(),
            expires_in: Some(3600),
            user: TokenUser {
                id: "u-1".to_string(),
                email: None,
            },
        };
        let session = response.into_session();
        assert!(session.expires_at > Utc::now() + chrono::Duration::minutes(59));
    }
}

#[cfg(all(test, feature = "http-tests"))]
mod http_tests {
    use super::*;
    use crate::error::{Error, ErrorClass};
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> RestClient {
        RestClient::new(&server.url(), Some("anon".to_string()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_sends_filters_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/schools")
            .match_header("apikey", "anon")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("sector_id".into(), "eq.s-1".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"id": "sc-1"}, {"id": "sc-2"}]"#)
            .create_async()
            .await;

        let rows = client(&server)
            .list(Resource::Schools, &ListQuery::new().filter("sector_id", "s-1"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/regions")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/sectors")
            .with_status(422)
            .with_body("name is required")
            .create_async()
            .await;

        let client = client(&server);
        let err = client
            .list(Resource::Regions, &ListQuery::new())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);

        let err = client
            .mutate(&Mutation::Create {
                resource: Resource::Sectors,
                data: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::BadRequest(ref m)) if m.contains("name")));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let err = client(&server).sign_in("a@b.c", "wrong").await.unwrap_err();
        assert!(err.is_authorization());
    }
}
