//! # me-backend-rest
//!
//! `AuthProvider` and `TableClient` over a Supabase-compatible HTTP API:
//! GoTrue-style auth under `/auth/v1`, PostgREST-style tables under
//! `/rest/v1`. The client keeps the current session and refreshes it when
//! it runs out.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use me_core::models::{AuthSession, AuthUser, SignUpRequest, SignUpResponse};
use me_core::traits::{AuthProvider, Filter, Row, TableClient};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// Keys GoTrue and PostgREST use for the human-readable error, in order of preference.
const ERROR_KEYS: [&str; 4] = ["error_description", "msg", "message", "error"];

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 10;

struct StoredSession {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
    user: AuthUser,
}

impl StoredSession {
    fn to_auth_session(&self) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(self.access_token.expose_secret().to_string()),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_string())),
            expires_at: self.expires_at,
            user: self.user.clone(),
        }
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
    }
}

/// Token endpoint payload.
#[derive(Deserialize)]
struct SessionPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl SessionPayload {
    fn into_stored(self, now: DateTime<Utc>) -> StoredSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        StoredSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

pub struct RestBackend {
    base_url: String,
    anon_key: SecretString,
    client: reqwest::Client,
    session: Mutex<Option<StoredSession>>,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: SecretString) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            client,
            session: Mutex::new(None),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Adds the API key and the bearer token: the user's when signed in,
    /// refreshed first if it ran out.
    async fn authorize(&self, request: RequestBuilder) -> anyhow::Result<RequestBuilder> {
        let bearer = match self.current_session().await? {
            Some(session) => session.access_token.expose_secret().to_string(),
            None => self.anon_key.expose_secret().to_string(),
        };
        Ok(request.header("apikey", self.anon_key.expose_secret()).bearer_auth(bearer))
    }

    async fn token_grant<T: Serialize>(&self, grant_type: &str, body: &T) -> anyhow::Result<StoredSession> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", self.anon_key.expose_secret())
            .json(body)
            .send()
            .await
            .context("auth service unreachable")?;
        let payload: SessionPayload = json_or_error(response).await?;
        Ok(payload.into_stored(Utc::now()))
    }
}

/// Decodes a success body, or turns the error body into its message.
async fn json_or_error<T: serde::de::DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    let response = check(response).await?;
    response.json().await.context("unexpected response body")
}

async fn check(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!(error_message(status, &body)))
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ERROR_KEYS
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

/// `col=eq.value` query pairs.
fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| {
            let value = match &f.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (f.column.clone(), format!("eq.{value}"))
        })
        .collect()
}

/// Sign-up answers with a session when the account is usable right away,
/// and with the bare user otherwise.
fn parse_sign_up(body: Value, now: DateTime<Utc>) -> anyhow::Result<(Option<AuthUser>, Option<StoredSession>)> {
    if body.get("access_token").is_some() {
        let payload: SessionPayload = serde_json::from_value(body)?;
        let stored = payload.into_stored(now);
        return Ok((Some(stored.user.clone()), Some(stored)));
    }
    if body.get("id").is_some() {
        return Ok((Some(serde_json::from_value(body)?), None));
    }
    Ok((None, None))
}

#[async_trait]
impl TableClient for RestBackend {
    async fn select(&self, table: &str, filters: &[Filter]) -> anyhow::Result<Vec<Row>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filters));
        log::debug!("select {table} {params:?}");

        let request = self.client.get(self.table_url(table)).query(&params);
        let response = self.authorize(request).await?.send().await.context("data service unreachable")?;
        json_or_error(response).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        log::debug!("insert {} rows into {table}", rows.len());
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&rows);
        let response = self.authorize(request).await?.send().await.context("data service unreachable")?;
        json_or_error(response).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> anyhow::Result<Vec<Row>> {
        log::debug!("update {table} where {:?}", filter_params(filters));
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = self.authorize(request).await?.send().await.context("data service unreachable")?;
        json_or_error(response).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> anyhow::Result<()> {
        log::debug!("delete from {table} where {:?}", filter_params(filters));
        let request = self.client.delete(self.table_url(table)).query(&filter_params(filters));
        let response = self.authorize(request).await?.send().await.context("data service unreachable")?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for RestBackend {
    async fn sign_up(&self, request: SignUpRequest) -> anyhow::Result<SignUpResponse> {
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", self.anon_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("auth service unreachable")?;
        let body: Value = json_or_error(response).await?;

        let (user, stored) = parse_sign_up(body, Utc::now())?;
        let session = stored.as_ref().map(StoredSession::to_auth_session);
        if stored.is_some() {
            *self.session.lock().await = stored;
        }
        Ok(SignUpResponse { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> anyhow::Result<AuthSession> {
        let stored = self.token_grant("password", &PasswordGrant { email, password }).await?;
        let session = stored.to_auth_session();
        *self.session.lock().await = Some(stored);
        Ok(session)
    }

    async fn sign_out(&self) -> anyhow::Result<()> {
        // An expired session that could not be refreshed is already gone.
        if self.current_session().await?.is_none() {
            return Ok(());
        }
        let request = self.client.post(self.auth_url("logout"));
        let response = self.authorize(request).await?.send().await.context("auth service unreachable")?;
        check(response).await?;
        *self.session.lock().await = None;
        Ok(())
    }

    async fn current_session(&self) -> anyhow::Result<Option<AuthSession>> {
        let mut session = self.session.lock().await;
        let Some(stored) = session.as_ref() else {
            return Ok(None);
        };
        if !stored.needs_refresh(Utc::now()) {
            return Ok(Some(stored.to_auth_session()));
        }

        let Some(refresh_token) = stored.refresh_token.as_ref().map(|t| t.expose_secret().to_string()) else {
            *session = None;
            return Ok(None);
        };
        // The lock stays held so concurrent callers don't refresh twice.
        match self.token_grant("refresh_token", &RefreshGrant { refresh_token: &refresh_token }).await {
            Ok(refreshed) => {
                log::info!("session refreshed for user {}", refreshed.user.id);
                let current = refreshed.to_auth_session();
                *session = Some(refreshed);
                Ok(Some(current))
            }
            Err(e) => {
                log::warn!("session refresh failed: {e}");
                *session = None;
                Ok(None)
            }
        }
    }

    /// Asks the server who the token belongs to. A rejected token reads as
    /// no user.
    async fn current_user(&self) -> anyhow::Result<Option<AuthUser>> {
        let Some(session) = self.current_session().await? else {
            return Ok(None);
        };
        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await
            .context("auth service unreachable")?;

        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        json_or_error(response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> RestBackend {
        RestBackend::new("https://xyz.supabase.co/", SecretString::from("anon".to_string())).unwrap()
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let backend = backend();
        assert_eq!(backend.auth_url("signup"), "https://xyz.supabase.co/auth/v1/signup");
        assert_eq!(backend.table_url("tasks"), "https://xyz.supabase.co/rest/v1/tasks");
    }

    #[test]
    fn filters_render_as_equality_params() {
        let params = filter_params(&[Filter::eq("id", "t1"), Filter::eq("completed", true)]);
        assert_eq!(
            params,
            vec![("id".to_string(), "eq.t1".to_string()), ("completed".to_string(), "eq.true".to_string())]
        );
    }

    #[test]
    fn error_messages_prefer_descriptive_keys() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(error_message(StatusCode::BAD_REQUEST, body), "Invalid login credentials");

        let body = r#"{"code":"42501","message":"permission denied for table tasks"}"#;
        assert_eq!(error_message(StatusCode::FORBIDDEN, body), "permission denied for table tasks");

        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>"),
            "request failed with status 502 Bad Gateway"
        );
    }

    #[test]
    fn sign_up_with_session() {
        let now = Utc::now();
        let body = json!({
            "access_token": "jwt",
            "refresh_token": "r1",
            "expires_in": 3600,
            "user": { "id": "u1", "email": "ana@example.com", "identities": [{ "id": "i1", "provider": "email" }] }
        });
        let (user, stored) = parse_sign_up(body, now).unwrap();
        assert_eq!(user.unwrap().identities.len(), 1);

        let stored = stored.unwrap();
        assert_eq!(stored.expires_at, Some(now + Duration::seconds(3600)));
        assert!(!stored.needs_refresh(now));
        assert!(stored.needs_refresh(now + Duration::seconds(3595)));
    }

    #[test]
    fn sign_up_for_taken_address_has_no_identities() {
        let body = json!({ "id": "u1", "email": "ana@example.com", "identities": [] });
        let (user, stored) = parse_sign_up(body, Utc::now()).unwrap();
        assert!(user.unwrap().identities.is_empty());
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn anonymous_client_has_no_session() {
        let backend = backend();
        assert!(backend.current_session().await.unwrap().is_none());
        assert!(backend.current_user().await.unwrap().is_none());
        backend.sign_out().await.unwrap();
    }

    fn stored(access_token: &str, expires_at: DateTime<Utc>) -> StoredSession {
        StoredSession {
            access_token: SecretString::from(access_token.to_string()),
            refresh_token: None,
            expires_at: Some(expires_at),
            user: serde_json::from_value(json!({ "id": "u1" })).unwrap(),
        }
    }

    fn bearer(request: &reqwest::Request) -> Option<&str> {
        request.headers().get("authorization").and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn table_calls_carry_the_live_user_token() {
        let backend = backend();
        *backend.session.lock().await = Some(stored("user-jwt", Utc::now() + Duration::hours(1)));

        let request = backend.authorize(backend.client.get(backend.table_url("tasks"))).await.unwrap();
        let request = request.build().unwrap();
        assert_eq!(bearer(&request), Some("Bearer user-jwt"));
        assert_eq!(request.headers().get("apikey").and_then(|v| v.to_str().ok()), Some("anon"));
    }

    #[tokio::test]
    async fn table_calls_drop_an_expired_token_that_cannot_refresh() {
        let backend = backend();
        *backend.session.lock().await = Some(stored("stale-jwt", Utc::now() - Duration::minutes(1)));

        let request = backend.authorize(backend.client.get(backend.table_url("tasks"))).await.unwrap();
        assert_eq!(bearer(&request.build().unwrap()), Some("Bearer anon"));
        assert!(backend.session.lock().await.is_none());
    }
}
