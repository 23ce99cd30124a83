//! # Core Traits (Ports)
//!
//! Any backend plugin must implement these traits to be used by the binary.
//! They describe the managed backend as a request/response client: keyed
//! row operations plus the auth session.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::{AuthSession, AuthUser, SignUpRequest, SignUpResponse};

/// One row as the backend sends and receives it.
pub type Row = Map<String, Value>;

/// Column equality condition (`column = value`).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self { column: column.to_string(), value: value.into() }
    }

    /// True when `row` satisfies the condition.
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// Row storage contract. Access scoping to the caller is the backend's job.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TableClient: Send + Sync {
    /// All rows of `table` matching every filter.
    async fn select(&self, table: &str, filters: &[Filter]) -> anyhow::Result<Vec<Row>>;

    /// Inserts `rows` and returns them as stored.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> anyhow::Result<Vec<Row>>;

    /// Merges `patch` into matching rows and returns them as stored.
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> anyhow::Result<Vec<Row>>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> anyhow::Result<()>;
}

/// Identity contract of the managed auth service.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, request: SignUpRequest) -> anyhow::Result<SignUpResponse>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> anyhow::Result<AuthSession>;

    /// Ends the provider-side session and forgets the local one.
    async fn sign_out(&self) -> anyhow::Result<()>;

    /// The locally held session, refreshed by the provider if it can.
    async fn current_session(&self) -> anyhow::Result<Option<AuthSession>>;

    /// The user behind the current session, as confirmed by the provider.
    async fn current_user(&self) -> anyhow::Result<Option<AuthUser>>;
}
