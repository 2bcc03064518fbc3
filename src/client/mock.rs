//! Mock registry client for testing
//!
//! Provides an in-memory implementation of the API traits for unit testing
//! without making real API calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::api::{AuthApi, DataApi};
use super::models::{AuthSession, ListQuery, Mutation, Profile, Resource};
use crate::error::{ApiError, Result};

/// Mock API client for testing.
///
/// Configure rows, profile and scripted failures via builder methods.
///
/// # Example
/// ```ignore
/// let mock = MockRegistryClient::new()
///     .with_rows(Resource::Regions, vec![json!({"id": "r-1"})])
///     .with_failures(vec![ApiError::Network("down".into())]);
/// ```
#[derive(Default)]
pub struct MockRegistryClient {
    rows: Arc<Mutex<HashMap<Resource, Vec<Value>>>>,
    profile: Arc<Mutex<Option<Profile>>>,
    password: Arc<Mutex<Option<String>>>,
    /// Errors returned by successive calls, consumed one per call
    failures: Arc<Mutex<VecDeque<ApiError>>>,
    access_token: Arc<Mutex<Option<String>>>,
    call_count: Arc<Mutex<CallCounts>>,
    /// Mutations that reached the "server"
    applied: Arc<Mutex<Vec<Mutation>>>,
    next_id: Arc<Mutex<u32>>,
}

/// Tracks API call counts for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub sign_in: usize,
    pub refresh_session: usize,
    pub sign_out: usize,
    pub fetch_profile: usize,
    pub list: usize,
    pub get: usize,
    pub mutate: usize,
}

impl CallCounts {
    /// Get total number of API calls made.
    pub fn total(&self) -> usize {
        self.sign_in
            + self.refresh_session
            + self.sign_out
            + self.fetch_profile
            + self.list
            + self.get
            + self.mutate
    }
}

impl MockRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, resource: Resource, rows: Vec<Value>) -> Self {
        if let Ok(mut map) = self.rows.try_lock() {
            map.insert(resource, rows);
        }
        self
    }

    /// Profile returned by `fetch_profile` and the account `sign_in` accepts
    pub fn with_profile(self, profile: Profile, password: &str) -> Self {
        if let Ok(mut p) = self.profile.try_lock() {
            *p = Some(profile);
        }
        if let Ok(mut pw) = self.password.try_lock() {
            *pw = Some(password.to_string());
        }
        self
    }

    pub fn with_failures(self, failures: Vec<ApiError>) -> Self {
        if let Ok(mut f) = self.failures.try_lock() {
            f.extend(failures);
        }
        self
    }

    /// Queue more failures after construction
    pub async fn fail_next(&self, failures: Vec<ApiError>) {
        self.failures.lock().await.extend(failures);
    }

    pub async fn set_profile(&self, profile: Option<Profile>) {
        *self.profile.lock().await = profile;
    }

    pub async fn call_counts(&self) -> CallCounts {
        self.call_count.lock().await.clone()
    }

    pub async fn applied(&self) -> Vec<Mutation> {
        self.applied.lock().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.lock().await.clone()
    }

    async fn take_failure(&self) -> Result<()> {
        match self.failures.lock().await.pop_front() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn issue_session(user_id: &str, email: Option<String>) -> AuthSession {
        AuthSession {
            access_token: format!("access-{}", uuid::Uuid::new_v4()),
            refresh_token: format!("refresh-{}", uuid::Uuid::new_v4()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user_id: user_id.to_string(),
            email,
        }
    }
}

#[async_trait]
impl AuthApi for MockRegistryClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.call_count.lock().await.sign_in += 1;
        self.take_failure().await?;

        let profile = self.profile.lock().await.clone();
        let expected = self.password.lock().await.clone();
        match (profile, expected) {
            (Some(profile), Some(expected))
                if profile.email.as_deref() == Some(email) && expected == password =>
            {
                Ok(Self::issue_session(&profile.id, profile.email))
            }
            _ => Err(ApiError::Unauthorized.into()),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.call_count.lock().await.refresh_session += 1;
        self.take_failure().await?;

        if !refresh_token.starts_with("refresh-") {
            return Err(ApiError::Unauthorized.into());
        }
        let profile = self
            .profile
            .lock()
            .await
            .clone()
            .ok_or(ApiError::Unauthorized)?;
        Ok(Self::issue_session(&profile.id, profile.email))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<()> {
        self.call_count.lock().await.sign_out += 1;
        self.take_failure().await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Profile> {
        self.call_count.lock().await.fetch_profile += 1;
        self.take_failure().await?;

        match self.profile.lock().await.clone() {
            Some(profile) if profile.id == user_id => Ok(profile),
            _ => Err(ApiError::NotFound(format!("profile {}", user_id)).into()),
        }
    }

    async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.lock().await = token;
    }
}

#[async_trait]
impl DataApi for MockRegistryClient {
    async fn list(&self, resource: Resource, query: &ListQuery) -> Result<Vec<Value>> {
        self.call_count.lock().await.list += 1;
        self.take_failure().await?;

        let rows = self.rows.lock().await;
        let mut matched: Vec<Value> = rows
            .get(&resource)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        query
                            .filters
                            .iter()
                            .all(|(k, v)| row.get(k).and_then(|x| x.as_str()) == Some(v))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn get(&self, resource: Resource, id: &str) -> Result<Value> {
        self.call_count.lock().await.get += 1;
        self.take_failure().await?;

        let rows = self.rows.lock().await;
        rows.get(&resource)
            .and_then(|rows| {
                rows.iter()
                    .find(|row| row.get("id").and_then(|x| x.as_str()) == Some(id))
            })
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", resource, id)).into())
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<Value> {
        self.call_count.lock().await.mutate += 1;
        self.take_failure().await?;

        let mut rows = self.rows.lock().await;
        let table = rows.entry(mutation.resource()).or_default();
        let result = match mutation {
            Mutation::Create { data, .. } => {
                let mut next = self.next_id.lock().await;
                *next += 1;
                let mut row = data.clone();
                if let Some(obj) = row.as_object_mut() {
                    obj.entry("id")
                        .or_insert_with(|| json!(format!("new-{}", *next)));
                }
                table.push(row.clone());
                row
            }
            Mutation::Update { id, data, .. } => {
                let row = table
                    .iter_mut()
                    .find(|row| row.get("id").and_then(|x| x.as_str()) == Some(id.as_str()))
                    .ok_or_else(|| ApiError::NotFound(id.clone()))?;
                if let (Some(target), Some(patch)) = (row.as_object_mut(), data.as_object()) {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                }
                row.clone()
            }
            Mutation::Delete { id, .. } => {
                table.retain(|row| row.get("id").and_then(|x| x.as_str()) != Some(id.as_str()));
                Value::Null
            }
        };
        self.applied.lock().await.push(mutation.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_consumed_in_order() {
        let mock = MockRegistryClient::new()
            .with_rows(Resource::Regions, vec![json!({"id": "r-1"})])
            .with_failures(vec![ApiError::Network("down".to_string())]);

        assert!(mock.list(Resource::Regions, &ListQuery::new()).await.is_err());
        assert_eq!(
            mock.list(Resource::Regions, &ListQuery::new())
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(mock.call_counts().await.list, 2);
    }

    #[tokio::test]
    async fn test_mutations_apply() {
        let mock = MockRegistryClient::new();
        let created = mock
            .mutate(&Mutation::Create {
                resource: Resource::Schools,
                data: json!({"name": "School 1"}),
            })
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        mock.mutate(&Mutation::Update {
            resource: Resource::Schools,
            id: id.clone(),
            data: json!({"name": "Renamed"}),
        })
        .await
        .unwrap();
        let row = mock.get(Resource::Schools, &id).await.unwrap();
        assert_eq!(row["name"], "Renamed");

        mock.mutate(&Mutation::Delete {
            resource: Resource::Schools,
            id: id.clone(),
        })
        .await
        .unwrap();
        assert!(mock.get(Resource::Schools, &id).await.is_err());
        assert_eq!(mock.applied().await.len(), 3);
    }

    #[tokio::test]
    async fn test_sign_in_checks_credentials() {
        let profile = Profile {
            id: "u-1".to_string(),
            email: Some("admin@example.org".to_string()),
            ..Default::default()
        };
        let mock = MockRegistryClient::new().with_profile(profile, "secret");

        assert!(mock.sign_in("admin@example.org", "wrong").await.is_err());
        let session = mock.sign_in("admin@example.org", "secret").await.unwrap();
        assert_eq!(session.user_id, "u-1");
    }
}
