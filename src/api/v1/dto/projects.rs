/*
 * Responsibility
 * - Projects の request/response DTO
 * - Response は cache にもそのまま載る (Serialize + Deserialize)
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repos::ProjectRow;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CreateProjectRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("name is required");
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdateProjectRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err("name cannot be empty");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub task_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectResponse {
    pub fn from_row(row: ProjectRow, task_count: usize) -> Self {
        Self {
            id: row.project_id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            task_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
