//! # me-backend-memory
//!
//! In-process implementation of `AuthProvider` and `TableClient`.
//! Behaves like the managed backend where the client can tell the
//! difference: rows are scoped to the signed-in user, a fresh account gets
//! its `user_settings` row, and signing up an existing address answers
//! with an identity-less user instead of an error.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use me_core::models::{tables, AuthSession, AuthUser, Identity, SignUpRequest, SignUpResponse, UserSettings};
use me_core::traits::{AuthProvider, Filter, Row, TableClient};
use secrecy::SecretString;
use serde_json::Value;
use uuid::Uuid;

const OWNER_COLUMN: &str = "user_id";
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user: AuthUser,
    /// Argon2 PHC string
    password_hash: String,
}

struct LiveSession {
    user: AuthUser,
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl LiveSession {
    fn to_auth_session(&self) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(self.access_token.clone()),
            refresh_token: None,
            expires_at: Some(self.expires_at),
            user: self.user.clone(),
        }
    }
}

pub struct MemoryBackend {
    tables: DashMap<String, Vec<Row>>,
    /// Keyed by lowercased email
    accounts: DashMap<String, Account>,
    session: Mutex<Option<LiveSession>>,
    session_ttl: Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Sessions last one hour.
    pub fn new() -> Self {
        Self::with_session_ttl(Duration::hours(1))
    }

    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        Self {
            tables: DashMap::new(),
            accounts: DashMap::new(),
            session: Mutex::new(None),
            session_ttl,
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<LiveSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The signed-in user, dropping the session once it expired.
    fn live_user(&self) -> Option<AuthUser> {
        let mut session = self.session();
        match session.as_ref() {
            Some(live) if live.expires_at > Utc::now() => Some(live.user.clone()),
            Some(_) => {
                log::debug!("memory session expired");
                *session = None;
                None
            }
            None => None,
        }
    }

    fn owner_id(&self) -> anyhow::Result<String> {
        self.live_user()
            .map(|user| user.id)
            .ok_or_else(|| anyhow!("new row violates row-level security policy"))
    }

    fn open_session(&self, user: AuthUser) -> AuthSession {
        let live = LiveSession {
            user,
            access_token: Uuid::new_v4().simple().to_string(),
            expires_at: Utc::now() + self.session_ttl,
        };
        let session = live.to_auth_session();
        *self.session() = Some(live);
        session
    }

    fn owns(&self, table: &str, owner: &str, id: &Value) -> bool {
        let by_id = [Filter { column: "id".to_string(), value: id.clone() }];
        self.tables
            .get(table)
            .is_some_and(|rows| rows.iter().any(|r| visible(r, owner, &by_id)))
    }

    fn insert_owned(&self, table: &str, owner: &str, rows: Vec<Row>) -> Vec<Row> {
        let stored: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                row.entry("id").or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                row.insert(OWNER_COLUMN.to_string(), Value::String(owner.to_string()));
                apply_column_defaults(table, &mut row);
                row
            })
            .collect();
        self.tables.entry(table.to_string()).or_default().extend(stored.iter().cloned());
        stored
    }
}

/// Server-side defaults of the known tables.
fn apply_column_defaults(table: &str, row: &mut Row) {
    match table {
        tables::TASKS => {
            row.entry("description").or_insert(Value::Null);
            row.entry("status").or_insert_with(|| Value::String("todo".to_string()));
        }
        tables::SUBTASKS => {
            row.entry("completed").or_insert(Value::Bool(false));
        }
        _ => {}
    }
}

fn visible(row: &Row, owner: &str, filters: &[Filter]) -> bool {
    row.get(OWNER_COLUMN).and_then(Value::as_str) == Some(owner) && filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl TableClient for MemoryBackend {
    /// Anonymous callers see no rows.
    async fn select(&self, table: &str, filters: &[Filter]) -> anyhow::Result<Vec<Row>> {
        let Some(owner) = self.live_user().map(|u| u.id) else {
            return Ok(Vec::new());
        };
        Ok(self
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| visible(r, &owner, filters)).cloned().collect())
            .unwrap_or_default())
    }

    /// Steps must point at one of the caller's tasks.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        let owner = self.owner_id()?;
        if table == tables::SUBTASKS {
            let orphan = rows
                .iter()
                .any(|row| !self.owns(tables::TASKS, &owner, row.get("task_id").unwrap_or(&Value::Null)));
            if orphan {
                return Err(anyhow!(
                    "insert or update on table \"subtasks\" violates foreign key constraint \"subtasks_task_id_fkey\""
                ));
            }
        }
        Ok(self.insert_owned(table, &owner, rows))
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> anyhow::Result<Vec<Row>> {
        let Some(owner) = self.live_user().map(|u| u.id) else {
            return Ok(Vec::new());
        };
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| visible(r, &owner, filters)) {
            for (column, value) in &patch {
                if column != "id" && column != OWNER_COLUMN {
                    row.insert(column.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    /// Deleting a task also deletes its steps.
    async fn delete(&self, table: &str, filters: &[Filter]) -> anyhow::Result<()> {
        let Some(owner) = self.live_user().map(|u| u.id) else {
            return Ok(());
        };
        let removed_ids: Vec<Value> = match self.tables.get_mut(table) {
            Some(mut rows) => {
                let (removed, kept): (Vec<Row>, Vec<Row>) =
                    rows.drain(..).partition(|r| visible(r, &owner, filters));
                *rows = kept;
                removed.into_iter().filter_map(|r| r.get("id").cloned()).collect()
            }
            None => return Ok(()),
        };

        if table == tables::TASKS && !removed_ids.is_empty() {
            if let Some(mut steps) = self.tables.get_mut(tables::SUBTASKS) {
                steps.retain(|s| !s.get("task_id").is_some_and(|id| removed_ids.contains(id)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn sign_up(&self, request: SignUpRequest) -> anyhow::Result<SignUpResponse> {
        if !request.email.contains('@') {
            return Err(anyhow!("Unable to validate email address: invalid format"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(anyhow!("Password should be at least {MIN_PASSWORD_LEN} characters."));
        }
        let key = request.email.to_lowercase();

        // Existing address: answer like a fresh sign-up, minus identities.
        if let Some(existing) = self.accounts.get(&key) {
            let mut user = existing.user.clone();
            user.identities.clear();
            return Ok(SignUpResponse { user: Some(user), session: None });
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(request.password.as_bytes(), &salt)
            .map_err(|e| anyhow!("failed to hash password: {e}"))?
            .to_string();

        let user_id = Uuid::new_v4().to_string();
        let user = AuthUser {
            id: user_id.clone(),
            email: Some(request.email.clone()),
            user_metadata: request.data,
            identities: vec![Identity { id: Uuid::new_v4().to_string(), provider: "email".to_string() }],
        };
        self.accounts.insert(key, Account { user: user.clone(), password_hash });

        let settings = match serde_json::to_value(UserSettings::defaults_for(&user_id))? {
            Value::Object(row) => row,
            _ => return Err(anyhow!("settings defaults are not an object")),
        };
        self.insert_owned(tables::USER_SETTINGS, &user_id, vec![settings]);

        log::debug!("memory backend created account {user_id}");
        let session = self.open_session(user.clone());
        Ok(SignUpResponse { user: Some(user), session: Some(session) })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> anyhow::Result<AuthSession> {
        let user = {
            let account = self
                .accounts
                .get(&email.to_lowercase())
                .ok_or_else(|| anyhow!("Invalid login credentials"))?;
            let parsed_hash = PasswordHash::new(&account.password_hash)
                .map_err(|e| anyhow!("stored password hash is unreadable: {e}"))?;
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .map_err(|_| anyhow!("Invalid login credentials"))?;
            account.user.clone()
        };
        Ok(self.open_session(user))
    }

    async fn sign_out(&self) -> anyhow::Result<()> {
        *self.session() = None;
        Ok(())
    }

    async fn current_session(&self) -> anyhow::Result<Option<AuthSession>> {
        if self.live_user().is_none() {
            return Ok(None);
        }
        Ok(self.session().as_ref().map(LiveSession::to_auth_session))
    }

    async fn current_user(&self) -> anyhow::Result<Option<AuthUser>> {
        Ok(self.live_user())
    }
}
