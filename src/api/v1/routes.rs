/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - 各 handler は Gated<R> を受け取るため、門番の適用はルート単位で型が決める
 */
use axum::{Router, routing::get};

use crate::state::AppState;

use crate::api::v1::handlers::{
    health::health,
    projects::{create_project, delete_project, get_project, list_projects, update_project},
    session::read_session,
    tasks::{create_task, delete_task, get_task, list_project_tasks, update_task},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/auth/session", get(read_session))
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{project_id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/projects/{project_id}/tasks",
            get(list_project_tasks).post(create_task),
        )
        .route(
            "/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}
