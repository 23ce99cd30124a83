//! me-core/src/lib.rs
//!
//! The central domain logic and port definitions for MindEase.

pub mod auth;
pub mod error;
pub mod models;
pub mod session;
pub mod settings;
pub mod tasks;
pub mod timer;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use auth::CredentialGateway;
pub use error::*;
pub use models::*;
pub use session::{Access, Route, RoutePolicy, SessionGuard, SessionSnapshot, SessionState};
pub use settings::PreferenceStore;
pub use tasks::{group_by_status, BoardColumns, TaskBoard, TaskStore};
pub use timer::{FocusTimer, FocusTimerHandle, TimerMode, TimerState};
pub use traits::*;
