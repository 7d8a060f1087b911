/*
 * Responsibility
 * - tasks handler (作成/一覧は親 project 経由, 個別は /tasks/{task_id})
 * - 親 project の view は task_count を含むため、task の書き込みは親のキーも落とす
 */
use axum::{Json, extract::State, http::StatusCode};

use super::projects::TASKS_VARIANT;
use super::{invalidate_after_write, target_id};
use crate::{
    api::v1::{
        dto::tasks::{CreateTaskRequest, TaskResponse, UpdateTaskRequest},
        extractors::{
            Gated,
            gated::{CreateTask, DeleteTask, ListProjectTasks, ReadTask, UpdateTask},
        },
    },
    error::AppError,
    policies::{PROJECT, TASK},
    services::cache::{InvalidationSet, keys},
    state::AppState,
};

// Task key, its parent project's view and task listing, and the project listing.
fn task_write_keys(task_id: u64, project_id: u64) -> InvalidationSet {
    let project = project_id.to_string();
    InvalidationSet::new()
        .entity(TASK, &task_id.to_string())
        .entity(PROJECT, &project)
        .variant(PROJECT, &project, TASKS_VARIANT)
        .listing(PROJECT)
}

pub async fn list_project_tasks(
    State(state): State<AppState>,
    gated: Gated<ListProjectTasks>,
) -> Result<Json<Vec<TaskResponse>>, AppError> {
    let project_id = target_id(&gated)?;
    let key = keys::variant_key(PROJECT, &project_id.to_string(), TASKS_VARIANT);

    let res = state
        .project_cache
        .get_or_load(&key, || async {
            if state.projects.get(project_id).is_none() {
                return Err(AppError::not_found("project"));
            }
            Ok(state
                .tasks
                .list_by_project(project_id)
                .into_iter()
                .map(TaskResponse::from)
                .collect::<Vec<_>>())
        })
        .await?;

    Ok(Json(res))
}

pub async fn create_task(
    State(state): State<AppState>,
    gated: Gated<CreateTask>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), AppError> {
    let project_id = target_id(&gated)?;
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_TASK", msg))?;
    let principal = gated.principal()?;

    if state.projects.get(project_id).is_none() {
        return Err(AppError::not_found("project"));
    }

    let row = state.tasks.create(
        project_id,
        req.title.trim(),
        req.assigned_to.as_deref().map(str::trim),
        principal.subject(),
    );
    tracing::info!(task_id = row.task_id, project_id, "task created");

    let project = project_id.to_string();
    invalidate_after_write(
        &state,
        &gated,
        InvalidationSet::new()
            .entity(PROJECT, &project)
            .variant(PROJECT, &project, TASKS_VARIANT)
            .listing(PROJECT),
    )
    .await;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(row))))
}

pub async fn get_task(
    State(state): State<AppState>,
    gated: Gated<ReadTask>,
) -> Result<Json<TaskResponse>, AppError> {
    let task_id = target_id(&gated)?;

    let res = state
        .task_cache
        .get_or_load(&keys::entity_key(TASK, &task_id.to_string()), || async {
            state
                .tasks
                .get(task_id)
                .map(TaskResponse::from)
                .ok_or(AppError::not_found("task"))
        })
        .await?;

    Ok(Json(res))
}

pub async fn update_task(
    State(state): State<AppState>,
    gated: Gated<UpdateTask>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, AppError> {
    let task_id = target_id(&gated)?;
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_TASK", msg))?;

    let row = state
        .tasks
        .update(
            task_id,
            req.title.as_deref().map(str::trim),
            req.done,
            req.assigned_to.as_deref().map(str::trim),
        )
        .ok_or(AppError::not_found("task"))?;

    invalidate_after_write(&state, &gated, task_write_keys(task_id, row.project_id)).await;

    Ok(Json(TaskResponse::from(row)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    gated: Gated<DeleteTask>,
) -> Result<StatusCode, AppError> {
    let task_id = target_id(&gated)?;

    let row = state
        .tasks
        .delete(task_id)
        .ok_or(AppError::not_found("task"))?;
    tracing::info!(task_id, project_id = row.project_id, "task deleted");

    invalidate_after_write(&state, &gated, task_write_keys(task_id, row.project_id)).await;

    Ok(StatusCode::NO_CONTENT)
}
