/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - gate, client key extraction, repos, cache regions
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::fmt;
use std::sync::Arc;

use crate::repos::{ProjectRepo, TaskRepo};
use crate::services::cache::CacheRegion;
use crate::services::gate::Gate;
use crate::services::rate_limit::ClientKeyExtractor;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
    pub client_keys: Arc<dyn ClientKeyExtractor>,
    pub projects: ProjectRepo,
    pub tasks: TaskRepo,
    pub project_cache: Arc<CacheRegion>,
    pub task_cache: Arc<CacheRegion>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("gate", &self.gate)
            .field("project_cache", &self.project_cache)
            .field("task_cache", &self.task_cache)
            .finish_non_exhaustive()
    }
}
