/*
 * Responsibility
 * - Tasks の request/response DTO
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repos::TaskRow;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub assigned_to: Option<String>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("title is required");
        }
        if let Some(assignee) = &self.assigned_to
            && assignee.trim().is_empty()
        {
            return Err("assigned_to cannot be empty");
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub done: Option<bool>,
    pub assigned_to: Option<String>,
}

impl UpdateTaskRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(title) = &self.title
            && title.trim().is_empty()
        {
            return Err("title cannot be empty");
        }
        if let Some(assignee) = &self.assigned_to
            && assignee.trim().is_empty()
        {
            return Err("assigned_to cannot be empty");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: u64,
    pub project_id: u64,
    pub title: String,
    pub done: bool,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskRow> for TaskResponse {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.task_id,
            project_id: row.project_id,
            title: row.title,
            done: row.done,
            assigned_to: row.assigned_to,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
