/*
 * Responsibility
 * - projects CRUD (in-process store)
 * - created_by is the subject that created the project; ownership checks read it
 */
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub project_id: u64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectRepo {
    rows: Arc<DashMap<u64, ProjectRow>>,
    next_id: Arc<AtomicU64>,
}

impl ProjectRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<ProjectRow> {
        let mut rows: Vec<ProjectRow> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by(|a, b| b.project_id.cmp(&a.project_id));
        rows
    }

    pub fn create(&self, name: &str, description: &str, created_by: &str) -> ProjectRow {
        let project_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();

        let row = ProjectRow {
            project_id,
            name: name.to_string(),
            description: description.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.rows.insert(project_id, row.clone());
        row
    }

    pub fn get(&self, project_id: u64) -> Option<ProjectRow> {
        self.rows.get(&project_id).map(|r| r.value().clone())
    }

    pub fn update(
        &self,
        project_id: u64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Option<ProjectRow> {
        let mut row = self.rows.get_mut(&project_id)?;

        if let Some(name) = name {
            row.name = name.to_string();
        }
        if let Some(description) = description {
            row.description = description.to_string();
        }
        row.updated_at = Utc::now();

        Some(row.clone())
    }

    pub fn delete(&self, project_id: u64) -> bool {
        self.rows.remove(&project_id).is_some()
    }
}
