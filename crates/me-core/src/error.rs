//! # AppError
//!
//! Centralized error handling for MindEase.
//! Every failure a user action can hit resolves to one of these variants,
//! and its `Display` is the message shown in the notification.

use thiserror::Error;

/// The primary error type for all me-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Auth provider rejected the call (bad credentials, provider outage).
    /// Carries the provider's message verbatim.
    #[error("{0}")]
    Auth(String),

    /// Sign-up answered with a user that has no identities.
    #[error("this email is already registered")]
    AlreadyRegistered,

    /// A per-user operation ran without a resolved user.
    #[error("user is not authenticated")]
    Unauthenticated,

    /// Missing row, or a single-row fetch that matched zero or several rows.
    #[error("{0} not found")]
    NotFound(String),

    /// Backend CRUD failure. Carries the backend's message verbatim.
    #[error("{0}")]
    Persistence(String),

    /// Client-side check failed before any network call.
    #[error("{0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wraps a port error, keeping its message as-is.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn auth(err: anyhow::Error) -> Self {
        Self::Auth(err.to_string())
    }
}

/// A specialized Result type for MindEase logic.
pub type Result<T> = std::result::Result<T, AppError>;
