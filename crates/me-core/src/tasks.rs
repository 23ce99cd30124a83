//! # Task Store
//!
//! CRUD over tasks and their steps, one backend round-trip per call, plus
//! the board's derived view and its local state holder.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::{tables, Step, StepPatch, StepRecord, Task, TaskPatch, TaskRecord, TaskStatus};
use crate::traits::{Filter, Row, TableClient};

#[derive(Clone)]
pub struct TaskStore {
    db: Arc<dyn TableClient>,
}

impl TaskStore {
    pub fn new(db: Arc<dyn TableClient>) -> Self {
        Self { db }
    }

    // Task Operations

    pub async fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        let rows = self.db.select(tables::TASKS, &[]).await.map_err(AppError::persistence)?;
        from_rows(rows)
    }

    pub async fn create_task(&self, title: &str, description: Option<&str>) -> Result<TaskRecord> {
        let row = to_row(&json!({ "title": title, "description": description }))?;
        let rows = self.db.insert(tables::TASKS, vec![row]).await.map_err(AppError::persistence)?;
        first(rows, "task")
    }

    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<TaskRecord> {
        let rows = self
            .db
            .update(tables::TASKS, to_row(patch)?, &[Filter::eq("id", id)])
            .await
            .map_err(AppError::persistence)?;
        first(rows, "task")
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.db
            .delete(tables::TASKS, &[Filter::eq("id", id)])
            .await
            .map_err(AppError::persistence)
    }

    // Step Operations

    pub async fn list_steps(&self, task_id: &str) -> Result<Vec<StepRecord>> {
        let rows = self
            .db
            .select(tables::SUBTASKS, &[Filter::eq("task_id", task_id)])
            .await
            .map_err(AppError::persistence)?;
        from_rows(rows)
    }

    pub async fn create_step(&self, task_id: &str, text: &str) -> Result<StepRecord> {
        let row = to_row(&json!({ "task_id": task_id, "title": text }))?;
        let rows = self.db.insert(tables::SUBTASKS, vec![row]).await.map_err(AppError::persistence)?;
        first(rows, "step")
    }

    pub async fn update_step(&self, step_id: &str, patch: &StepPatch) -> Result<StepRecord> {
        let rows = self
            .db
            .update(tables::SUBTASKS, to_row(patch)?, &[Filter::eq("id", step_id)])
            .await
            .map_err(AppError::persistence)?;
        first(rows, "step")
    }

    pub async fn delete_step(&self, step_id: &str) -> Result<()> {
        self.db
            .delete(tables::SUBTASKS, &[Filter::eq("id", step_id)])
            .await
            .map_err(AppError::persistence)
    }

    /// Lists every task, then each task's steps, one call after another.
    pub async fn load_board(&self) -> Result<Vec<Task>> {
        let records = self.list_tasks().await?;
        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            let steps = self.list_steps(&record.id).await?;
            tasks.push(Task::from_record(record, steps.into_iter().map(Step::from).collect()));
        }
        log::debug!("loaded board with {} tasks", tasks.len());
        Ok(tasks)
    }
}

fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(AppError::Persistence("payload is not an object".to_string())),
        Err(e) => Err(AppError::Persistence(e.to_string())),
    }
}

fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(|e| AppError::Persistence(e.to_string())))
        .collect()
}

/// The row a returning insert/update handed back. None back means the row
/// is gone or not visible to the caller.
fn first<T: DeserializeOwned>(rows: Vec<Row>, what: &str) -> Result<T> {
    from_rows(rows)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(what.to_string()))
}

/// The three board columns, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardColumns {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl BoardColumns {
    pub fn column(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Done => &self.done,
        }
    }
}

/// Tasks with `status`, in input order.
pub fn filter_by_status(tasks: &[Task], status: TaskStatus) -> Vec<Task> {
    tasks.iter().filter(|t| t.status == status).cloned().collect()
}

/// Partitions `tasks` by status, keeping relative order within each column.
pub fn group_by_status(tasks: &[Task]) -> BoardColumns {
    let mut columns = BoardColumns::default();
    for task in tasks {
        let column = match task.status {
            TaskStatus::Todo => &mut columns.todo,
            TaskStatus::InProgress => &mut columns.in_progress,
            TaskStatus::Done => &mut columns.done,
        };
        column.push(task.clone());
    }
    columns
}

/// Local task list owned by the board view. Changes here are immediate;
/// persisting them is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    tasks: Vec<Task>,
}

impl TaskBoard {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn replace(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    pub fn columns(&self) -> BoardColumns {
        group_by_status(&self.tasks)
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Returns the removed task.
    pub fn remove(&mut self, task_id: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == task_id)?;
        Some(self.tasks.remove(index))
    }

    pub fn push_step(&mut self, task_id: &str, step: Step) -> bool {
        match self.task_mut(task_id) {
            Some(task) => {
                task.steps.push(step);
                true
            }
            None => false,
        }
    }

    pub fn remove_step(&mut self, task_id: &str, step_id: &str) -> Option<Step> {
        let task = self.task_mut(task_id)?;
        let index = task.steps.iter().position(|s| s.id == step_id)?;
        Some(task.steps.remove(index))
    }

    /// Flips one step's completion and returns the new value. The parent's
    /// status is not touched.
    pub fn toggle_step(&mut self, task_id: &str, step_id: &str) -> Option<bool> {
        let step = self.task_mut(task_id)?.steps.iter_mut().find(|s| s.id == step_id)?;
        step.completed = !step.completed;
        Some(step.completed)
    }

    /// Replaces a task's status and returns the previous one.
    pub fn change_status(&mut self, task_id: &str, status: TaskStatus) -> Option<TaskStatus> {
        let task = self.task_mut(task_id)?;
        Some(std::mem::replace(&mut task.status, status))
    }

    fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }
}
