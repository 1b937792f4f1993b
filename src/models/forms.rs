use serde::Deserialize;
use chrono::NaiveDate;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetTimeForm {
    pub reset_hour: u32,
    pub reset_minute: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProfileUpdateForm {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub reset_hour: Option<u32>,
    pub reset_minute: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskForm {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<u8>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateTaskForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_completed: Option<bool>,
    pub priority: Option<u8>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskListQuery {
    pub completed: Option<bool>,
    pub priority: Option<u8>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub overdue: Option<bool>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BulkTaskIds {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkPriorityForm {
    pub task_ids: Vec<String>,
    pub priority: u8,
}
