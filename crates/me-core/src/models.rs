//! # Domain Models
//!
//! Records as the backend stores them (`TaskRecord`, `StepRecord`,
//! `UserSettings`), the patches sent to it, and the assembled `Task` the
//! board works with. Identifiers are opaque strings issued by the backend.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Table names on the backend.
pub mod tables {
    pub const TASKS: &str = "tasks";
    pub const SUBTASKS: &str = "subtasks";
    pub const USER_SETTINGS: &str = "user_settings";
}

/// Board column a task sits in.
///
/// `in_progress` is the persisted spelling; the older UI spelling
/// `progress` is still accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    #[serde(alias = "progress")]
    InProgress,
    Done,
}

impl TaskStatus {
    /// Column order on the board.
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

/// A row of the `tasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

/// A row of the `subtasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub task_id: String,
    #[serde(rename = "title")]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Partial update of a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }
}

/// Partial update of a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPatch {
    #[serde(rename = "title", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl StepPatch {
    pub fn completed(completed: bool) -> Self {
        Self { completed: Some(completed), ..Self::default() }
    }
}

/// One step of a task as the board shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

impl From<StepRecord> for Step {
    fn from(record: StepRecord) -> Self {
        Self { id: record.id, text: record.text, completed: record.completed }
    }
}

/// A task with its steps, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub steps: Vec<Step>,
}

impl Task {
    pub fn from_record(record: TaskRecord, steps: Vec<Step>) -> Self {
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            status: record.status,
            steps,
        }
    }

    /// Completed vs. total steps, as shown on a task card.
    pub fn progress(&self) -> StepProgress {
        let completed = self.steps.iter().filter(|s| s.completed).count();
        StepProgress { completed, total: self.steps.len() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepProgress {
    pub completed: usize,
    pub total: usize,
}

impl StepProgress {
    /// 0 when the task has no steps.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    #[default]
    Medium,
    Detailed,
}

impl ComplexityLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple => "Simple",
            Self::Medium => "Medium",
            Self::Detailed => "Detailed",
        }
    }
}

/// The single per-user row of `user_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,

    // Behavior
    pub focus_mode_default: bool,
    pub summary_mode_default: bool,
    pub guided_rhythm: bool,

    // Visual adjustments, percent
    pub font_size: i32,
    pub spacing: i32,
    pub contrast: i32,

    // Accessibility
    pub reduce_visual_stimuli: bool,
    pub disable_animations: bool,
    pub interface_rhythm: i32,

    pub complexity_level: ComplexityLevel,

    // Current overrides of the *_default flags
    pub focus_mode: bool,
    pub summary_mode: bool,
}

impl UserSettings {
    /// The record a backend creates for a fresh account.
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            focus_mode_default: false,
            summary_mode_default: false,
            guided_rhythm: true,
            font_size: 100,
            spacing: 100,
            contrast: 100,
            reduce_visual_stimuli: true,
            disable_animations: false,
            interface_rhythm: 100,
            complexity_level: ComplexityLevel::Medium,
            focus_mode: false,
            summary_mode: false,
        }
    }

    /// Label/value pairs for the profile page.
    pub fn preference_summary(&self) -> Vec<(&'static str, String)> {
        let on_off = |flag: bool| if flag { "On" } else { "Off" }.to_string();
        vec![
            ("Complexity", self.complexity_level.label().to_string()),
            ("Focus mode", on_off(self.focus_mode)),
            ("Font", format!("{}%", self.font_size)),
            ("Spacing", format!("{}%", self.spacing)),
        ]
    }
}

/// Partial update of `UserSettings`; only supplied fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_mode_default: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_mode_default: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_rhythm: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spacing: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_visual_stimuli: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_animations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_rhythm: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity_level: Option<ComplexityLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_mode: Option<bool>,
}

/// A linked login method of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub provider: String,
}

/// Profile metadata attached at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub name: Option<String>,
}

/// The authenticated user as the auth provider describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
    /// Empty on a sign-up for an address that already has an account.
    #[serde(default)]
    pub identities: Vec<Identity>,
}

/// A live session issued by the auth provider.
#[derive(Debug)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// What the provider answers to a sign-up.
///
/// `session` is present only when the account is usable right away.
#[derive(Debug)]
pub struct SignUpResponse {
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
}

/// Sign-up request forwarded to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub data: UserMetadata,
}
