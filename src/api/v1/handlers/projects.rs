/*
 * Responsibility
 * - /projects 系 CRUD handler
 * - 読み取りは project region の read-through cache 経由
 * - 書き込みは成功後に、影響するキー (自身, 一覧, 配下 task) を invalidate
 */
use axum::{Json, extract::State, http::StatusCode};

use super::{invalidate_after_write, target_id};
use crate::{
    api::v1::{
        dto::projects::{CreateProjectRequest, ProjectResponse, UpdateProjectRequest},
        extractors::{
            Gated,
            gated::{CreateProject, DeleteProject, ListProjects, ReadProject, UpdateProject},
        },
    },
    error::AppError,
    policies::{PROJECT, TASK},
    services::cache::{InvalidationSet, keys},
    state::AppState,
};

/// Variant key holding a project's task listing.
pub const TASKS_VARIANT: &str = "tasks";

fn project_view(state: &AppState, project_id: u64) -> Result<ProjectResponse, AppError> {
    let row = state
        .projects
        .get(project_id)
        .ok_or(AppError::not_found("project"))?;
    let task_count = state.tasks.list_by_project(project_id).len();
    Ok(ProjectResponse::from_row(row, task_count))
}

pub async fn list_projects(
    State(state): State<AppState>,
    _gated: Gated<ListProjects>,
) -> Result<Json<Vec<ProjectResponse>>, AppError> {
    let res = state
        .project_cache
        .get_or_load(&keys::listing_key(PROJECT), || async {
            let views = state
                .projects
                .list()
                .into_iter()
                .map(|row| {
                    let task_count = state.tasks.list_by_project(row.project_id).len();
                    ProjectResponse::from_row(row, task_count)
                })
                .collect::<Vec<_>>();
            Ok::<_, AppError>(views)
        })
        .await?;

    Ok(Json(res))
}

pub async fn create_project(
    State(state): State<AppState>,
    gated: Gated<CreateProject>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_PROJECT", msg))?;
    let principal = gated.principal()?;

    let row = state
        .projects
        .create(req.name.trim(), req.description.trim(), principal.subject());
    tracing::info!(project_id = row.project_id, subject = principal.subject(), "project created");

    invalidate_after_write(&state, &gated, InvalidationSet::new().listing(PROJECT)).await;

    Ok((StatusCode::CREATED, Json(ProjectResponse::from_row(row, 0))))
}

pub async fn get_project(
    State(state): State<AppState>,
    gated: Gated<ReadProject>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = target_id(&gated)?;

    let res = state
        .project_cache
        .get_or_load(&keys::entity_key(PROJECT, &project_id.to_string()), || async {
            project_view(&state, project_id)
        })
        .await?;

    Ok(Json(res))
}

pub async fn update_project(
    State(state): State<AppState>,
    gated: Gated<UpdateProject>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = target_id(&gated)?;
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_PROJECT", msg))?;

    state
        .projects
        .update(
            project_id,
            req.name.as_deref().map(str::trim),
            req.description.as_deref().map(str::trim),
        )
        .ok_or(AppError::not_found("project"))?;

    let id = project_id.to_string();
    invalidate_after_write(
        &state,
        &gated,
        InvalidationSet::new().entity(PROJECT, &id).listing(PROJECT),
    )
    .await;

    Ok(Json(project_view(&state, project_id)?))
}

pub async fn delete_project(
    State(state): State<AppState>,
    gated: Gated<DeleteProject>,
) -> Result<StatusCode, AppError> {
    let project_id = target_id(&gated)?;

    if !state.projects.delete(project_id) {
        return Err(AppError::not_found("project"));
    }
    let removed_tasks = state.tasks.delete_by_project(project_id);
    tracing::info!(project_id, tasks = removed_tasks.len(), "project deleted");

    let id = project_id.to_string();
    let mut stale = InvalidationSet::new()
        .entity(PROJECT, &id)
        .variant(PROJECT, &id, TASKS_VARIANT)
        .listing(PROJECT);
    for task_id in removed_tasks {
        stale.extend(InvalidationSet::new().entity(TASK, &task_id.to_string()));
    }
    invalidate_after_write(&state, &gated, stale).await;

    Ok(StatusCode::NO_CONTENT)
}
