//! # Preference Store
//!
//! Reads and patches the single `user_settings` row of the signed-in user.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{tables, SettingsPatch, UserSettings};
use crate::traits::{AuthProvider, Filter, Row, TableClient};

#[derive(Clone)]
pub struct PreferenceStore {
    db: Arc<dyn TableClient>,
    auth: Arc<dyn AuthProvider>,
}

impl PreferenceStore {
    pub fn new(db: Arc<dyn TableClient>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { db, auth }
    }

    pub async fn get_user_settings(&self) -> Result<UserSettings> {
        let user_id = self.current_user_id().await?;
        let rows = self
            .db
            .select(tables::USER_SETTINGS, &[Filter::eq("user_id", user_id)])
            .await
            .map_err(AppError::persistence)?;
        single_settings(rows)
    }

    /// Applies only the fields present in `patch` and returns the stored record.
    pub async fn update_user_settings(&self, patch: &SettingsPatch) -> Result<UserSettings> {
        patch.validate()?;
        let user_id = self.current_user_id().await?;
        let rows = self
            .db
            .update(tables::USER_SETTINGS, to_row(patch)?, &[Filter::eq("user_id", user_id)])
            .await
            .map_err(AppError::persistence)?;
        single_settings(rows)
    }

    async fn current_user_id(&self) -> Result<String> {
        match self.auth.current_user().await.map_err(AppError::auth)? {
            Some(user) => Ok(user.id),
            None => Err(AppError::Unauthenticated),
        }
    }
}

/// Exactly one row must come back.
fn single_settings(mut rows: Vec<Row>) -> Result<UserSettings> {
    if rows.len() != 1 {
        log::debug!("user_settings lookup matched {} rows", rows.len());
        return Err(AppError::NotFound("user settings".to_string()));
    }
    let row = rows.remove(0);
    serde_json::from_value(Value::Object(row)).map_err(|e| AppError::Persistence(e.to_string()))
}

fn to_row(patch: &SettingsPatch) -> Result<Row> {
    match serde_json::to_value(patch) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(AppError::Persistence("settings patch is not an object".to_string())),
        Err(e) => Err(AppError::Persistence(e.to_string())),
    }
}
