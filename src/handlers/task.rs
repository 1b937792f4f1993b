use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BulkPriorityForm, BulkTaskIds, CreateTaskForm, Task, TaskListQuery, TaskListResponse,
    TaskView, UpdateTaskForm, PRIORITY_HIGH, PRIORITY_LOW,
};
use crate::scheduler::{PurgeCoordinator, UserPurgeOutcome};
use crate::services::{PurgeStore, TaskStore};
use crate::state::AppState;
use super::session_user_id;

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

fn validate_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("Task title must not be empty".into()));
    }
    Ok(())
}

fn validate_priority(priority: u8) -> AppResult<()> {
    if !(PRIORITY_LOW..=PRIORITY_HIGH).contains(&priority) {
        return Err(AppError::Validation(format!(
            "Priority must be between {} and {}",
            PRIORITY_LOW, PRIORITY_HIGH
        )));
    }
    Ok(())
}

// Priority passed as a filter or bulk argument rather than a task field.
fn validate_priority_param(priority: u8) -> AppResult<()> {
    validate_priority(priority).map_err(|_| AppError::BadRequest("Priority must be 1, 2, or 3".into()))
}

fn apply_task_update(task: &mut Task, form: UpdateTaskForm, now: DateTime<Utc>) -> AppResult<()> {
    if let Some(title) = form.title {
        validate_title(&title)?;
        task.title = title;
    }
    if let Some(priority) = form.priority {
        validate_priority(priority)?;
        task.priority = priority;
    }
    if form.description.is_some() {
        task.description = form.description;
    }
    if form.category.is_some() {
        task.category = form.category;
    }
    if form.due_date.is_some() {
        task.due_date = form.due_date;
    }
    match form.is_completed {
        Some(completed) if completed != task.is_completed => task.set_completed(completed, now),
        _ => task.updated_at = Some(now),
    }
    Ok(())
}

fn build_list(tasks: Vec<Task>, query: &TaskListQuery, now: DateTime<Utc>) -> AppResult<TaskListResponse> {
    if let Some(priority) = query.priority {
        validate_priority_param(priority)?;
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::Validation(format!("limit must be between 1 and {}", MAX_PAGE_SIZE)));
    }

    let today = now.date_naive();
    let mut tasks: Vec<Task> = tasks
        .into_iter()
        .filter(|t| query.completed.map_or(true, |c| t.is_completed == c))
        .filter(|t| query.priority.map_or(true, |p| t.priority == p))
        .filter(|t| query.category.as_ref().map_or(true, |c| t.category.as_ref() == Some(c)))
        .filter(|t| query.due_date.map_or(true, |d| t.due_date == Some(d)))
        .filter(|t| query.overdue.map_or(true, |o| t.is_overdue(today) == o))
        .collect();
    // Newest first, like the dashboard
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = tasks.len();
    let completed = tasks.iter().filter(|t| t.is_completed).count();
    Ok(TaskListResponse {
        total,
        completed,
        pending: total - completed,
        tasks: tasks
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(limit)
            .map(|t| TaskView::new(t, today))
            .collect(),
    })
}

/// Applies the user's pending daily reset before their tasks are read, so
/// no read path can show tasks from before the latest boundary. Failures are
/// logged and swallowed: the stale tasks then linger until the next tick.
pub(crate) async fn apply_reset_on_access<S: PurgeStore>(
    coordinator: &PurgeCoordinator<S>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Option<UserPurgeOutcome> {
    match coordinator.run_once_for_user(user_id, now).await {
        Ok(outcome) => {
            if outcome.purged {
                tracing::info!("Reset applied for user {} on access: {} tasks removed", user_id, outcome.removed);
            }
            Some(outcome)
        }
        Err(e) => {
            tracing::warn!("Reset on access failed for user {}: {}", user_id, e);
            None
        }
    }
}

// Loads a task and checks it belongs to the caller.
async fn owned_task<T: TaskStore>(store: &T, user_id: &str, task_id: &str) -> AppResult<Task> {
    store
        .get_task(task_id)
        .await?
        .filter(|task| task.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))
}

// Every id must name one of the caller's tasks, or nothing is touched.
async fn owned_tasks<T: TaskStore>(store: &T, user_id: &str, task_ids: &[String]) -> AppResult<Vec<Task>> {
    if task_ids.is_empty() {
        return Err(AppError::BadRequest("No task IDs provided".into()));
    }
    let mut by_id: HashMap<String, Task> = store
        .list_tasks(user_id)
        .await?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();

    let wanted: BTreeSet<&String> = task_ids.iter().collect();
    let mut tasks = Vec::with_capacity(wanted.len());
    for id in wanted {
        match by_id.remove(id) {
            Some(task) => tasks.push(task),
            None => return Err(AppError::NotFound("Some tasks not found or not accessible".into())),
        }
    }
    Ok(tasks)
}

// Writes back an edited task; a task removed meanwhile stays removed.
async fn save_existing<T: TaskStore>(store: &T, task: &Task) -> AppResult<()> {
    if !store.update_task(task).await? {
        tracing::debug!("Task {} vanished before its update was written", task.id);
        return Err(AppError::NotFound(format!("Task {} not found", task.id)));
    }
    Ok(())
}

// Applies `change` to each task and writes back those it reports as changed.
async fn bulk_update<T, F>(store: &T, tasks: Vec<Task>, mut change: F) -> AppResult<usize>
where
    T: TaskStore,
    F: FnMut(&mut Task) -> bool,
{
    let mut updated = 0;
    for mut task in tasks {
        if change(&mut task) && store.update_task(&task).await? {
            updated += 1;
        }
    }
    Ok(updated)
}

pub async fn list_tasks(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<TaskListResponse>> {
    let user_id = session_user_id(&session).await?;
    let now = state.clock.now();
    apply_reset_on_access(&state.coordinator, &user_id, now).await;

    let tasks = state.redis_service.list_tasks(&user_id).await?;
    Ok(Json(build_list(tasks, &query, now)?))
}

pub async fn list_overdue_tasks(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<TaskListResponse>> {
    let user_id = session_user_id(&session).await?;
    let now = state.clock.now();
    apply_reset_on_access(&state.coordinator, &user_id, now).await;

    let tasks = state.redis_service.list_tasks(&user_id).await?;
    let query = TaskListQuery {
        overdue: Some(true),
        limit: Some(MAX_PAGE_SIZE),
        ..Default::default()
    };
    Ok(Json(build_list(tasks, &query, now)?))
}

pub async fn list_categories(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<String>>> {
    let user_id = session_user_id(&session).await?;
    apply_reset_on_access(&state.coordinator, &user_id, state.clock.now()).await;

    let categories: BTreeSet<String> = state
        .redis_service
        .list_tasks(&user_id)
        .await?
        .into_iter()
        .filter_map(|t| t.category)
        .collect();
    Ok(Json(categories.into_iter().collect()))
}

pub async fn create_task(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<CreateTaskForm>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    validate_title(&form.title)?;
    let priority = form.priority.unwrap_or(PRIORITY_LOW);
    validate_priority(priority)?;

    let max_tasks = state.config.user.max_tasks_per_user;
    if state.redis_service.count_tasks(&user_id).await? >= max_tasks {
        return Err(AppError::Validation(format!(
            "Task limit of {} reached",
            max_tasks
        )));
    }

    let now = state.clock.now();
    let mut task = Task::new(&user_id, form.title, now);
    task.description = form.description;
    task.priority = priority;
    task.category = form.category;
    task.due_date = form.due_date;
    state.redis_service.create_task(&task).await?;

    tracing::debug!("Created task {} for user {}", task.id, user_id);
    Ok((StatusCode::CREATED, Json(TaskView::new(task, now.date_naive()))))
}

pub async fn get_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<String>,
) -> AppResult<Json<TaskView>> {
    let user_id = session_user_id(&session).await?;
    let now = state.clock.now();
    apply_reset_on_access(&state.coordinator, &user_id, now).await;

    let task = owned_task(&state.redis_service, &user_id, &task_id).await?;
    Ok(Json(TaskView::new(task, now.date_naive())))
}

pub async fn update_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<String>,
    Json(form): Json<UpdateTaskForm>,
) -> AppResult<Json<TaskView>> {
    let user_id = session_user_id(&session).await?;
    let mut task = owned_task(&state.redis_service, &user_id, &task_id).await?;

    let now = state.clock.now();
    apply_task_update(&mut task, form, now)?;
    save_existing(&state.redis_service, &task).await?;
    Ok(Json(TaskView::new(task, now.date_naive())))
}

pub async fn toggle_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<String>,
) -> AppResult<Json<TaskView>> {
    let user_id = session_user_id(&session).await?;
    let mut task = owned_task(&state.redis_service, &user_id, &task_id).await?;

    let now = state.clock.now();
    let completed = !task.is_completed;
    task.set_completed(completed, now);
    save_existing(&state.redis_service, &task).await?;
    Ok(Json(TaskView::new(task, now.date_naive())))
}

pub async fn delete_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    owned_task(&state.redis_service, &user_id, &task_id).await?;

    state
        .redis_service
        .delete_task(&user_id, &task_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete task {}: {}", task_id, e);
            AppError::Store(e)
        })?;

    tracing::info!("Deleted task {} for user {}", task_id, user_id);
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

pub async fn purge_completed_tasks(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    let completed: Vec<Task> = state
        .redis_service
        .list_tasks(&user_id)
        .await?
        .into_iter()
        .filter(|t| t.is_completed)
        .collect();

    for task in &completed {
        state.redis_service.delete_task(&user_id, &task.id).await?;
    }

    tracing::info!("Purged {} completed tasks for user {}", completed.len(), user_id);
    Ok(Json(json!({ "message": format!("Purged {} completed tasks", completed.len()) })))
}

pub async fn bulk_delete_tasks(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<BulkTaskIds>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    apply_reset_on_access(&state.coordinator, &user_id, state.clock.now()).await;

    let tasks = owned_tasks(&state.redis_service, &user_id, &form.task_ids).await?;
    for task in &tasks {
        state.redis_service.delete_task(&user_id, &task.id).await?;
    }

    tracing::info!("Bulk deleted {} tasks for user {}", tasks.len(), user_id);
    Ok(Json(json!({ "message": format!("Successfully deleted {} tasks", tasks.len()) })))
}

pub async fn bulk_complete_tasks(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<BulkTaskIds>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    let now = state.clock.now();
    apply_reset_on_access(&state.coordinator, &user_id, now).await;

    let tasks = owned_tasks(&state.redis_service, &user_id, &form.task_ids).await?;
    let updated = bulk_update(&state.redis_service, tasks, |task| {
        if task.is_completed {
            return false;
        }
        task.set_completed(true, now);
        true
    })
    .await?;

    Ok(Json(json!({ "message": format!("Successfully completed {} tasks", updated) })))
}

pub async fn bulk_update_priority(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<BulkPriorityForm>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    validate_priority_param(form.priority)?;
    let now = state.clock.now();
    apply_reset_on_access(&state.coordinator, &user_id, now).await;

    let tasks = owned_tasks(&state.redis_service, &user_id, &form.task_ids).await?;
    let priority = form.priority;
    let updated = bulk_update(&state.redis_service, tasks, |task| {
        if task.priority == priority {
            return false;
        }
        task.priority = priority;
        task.updated_at = Some(now);
        true
    })
    .await?;

    Ok(Json(json!({ "message": format!("Successfully updated priority for {} tasks", updated) })))
}
