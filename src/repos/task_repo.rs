/*
 * Responsibility
 * - tasks CRUD (in-process store)
 * - a task always belongs to one project; deleting the project removes its tasks
 */
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub task_id: u64,
    pub project_id: u64,
    pub title: String,
    pub done: bool,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRepo {
    rows: Arc<DashMap<u64, TaskRow>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first.
    pub fn list_by_project(&self, project_id: u64) -> Vec<TaskRow> {
        let mut rows: Vec<TaskRow> = self
            .rows
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.task_id);
        rows
    }

    pub fn create(
        &self,
        project_id: u64,
        title: &str,
        assigned_to: Option<&str>,
        created_by: &str,
    ) -> TaskRow {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();

        let row = TaskRow {
            task_id,
            project_id,
            title: title.to_string(),
            done: false,
            assigned_to: assigned_to.map(str::to_string),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.rows.insert(task_id, row.clone());
        row
    }

    pub fn get(&self, task_id: u64) -> Option<TaskRow> {
        self.rows.get(&task_id).map(|r| r.value().clone())
    }

    pub fn update(
        &self,
        task_id: u64,
        title: Option<&str>,
        done: Option<bool>,
        assigned_to: Option<&str>,
    ) -> Option<TaskRow> {
        let mut row = self.rows.get_mut(&task_id)?;

        if let Some(title) = title {
            row.title = title.to_string();
        }
        if let Some(done) = done {
            row.done = done;
        }
        if let Some(assignee) = assigned_to {
            row.assigned_to = Some(assignee.to_string());
        }
        row.updated_at = Utc::now();

        Some(row.clone())
    }

    /// Returns the removed row so callers know its parent project.
    pub fn delete(&self, task_id: u64) -> Option<TaskRow> {
        self.rows.remove(&task_id).map(|(_, row)| row)
    }

    /// Remove every task of a project. Returns the removed task ids.
    pub fn delete_by_project(&self, project_id: u64) -> Vec<u64> {
        let ids: Vec<u64> = self
            .rows
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.task_id)
            .collect();

        ids.into_iter()
            .filter(|id| self.rows.remove(id).is_some())
            .collect()
    }
}
