use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};

pub const PRIORITY_LOW: u8 = 1;
pub const PRIORITY_HIGH: u8 = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    NoDueDate,
    Overdue,
    DueToday,
    DueTomorrow,
    DueSoon,
    DueLater,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub priority: u8,  // 1=Low, 2=Medium, 3=High
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,  // the daily purge keys on this
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(user_id: &str, title: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            description: None,
            is_completed: false,
            priority: PRIORITY_LOW,
            category: None,
            due_date: None,
            created_at,
            updated_at: None,
            completed_at: None,
        }
    }

    pub fn days_until_due(&self, today: NaiveDate) -> Option<i64> {
        self.due_date.map(|due| (due - today).num_days())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.due_date {
            Some(due) => today > due && !self.is_completed,
            None => false,
        }
    }

    pub fn due_status(&self, today: NaiveDate) -> DueStatus {
        match self.days_until_due(today) {
            None => DueStatus::NoDueDate,
            Some(days) if days < 0 => DueStatus::Overdue,
            Some(0) => DueStatus::DueToday,
            Some(1) => DueStatus::DueTomorrow,
            Some(days) if days <= 7 => DueStatus::DueSoon,
            Some(_) => DueStatus::DueLater,
        }
    }

    // Flips completion and keeps completed_at in step with it.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.is_completed = completed;
        self.completed_at = if completed { Some(now) } else { None };
        self.updated_at = Some(now);
    }
}

// Task as returned by the API, with the derived due status attached.
#[derive(Serialize, Debug, Clone)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub due_status: DueStatus,
}

impl TaskView {
    pub fn new(task: Task, today: NaiveDate) -> Self {
        let due_status = task.due_status(today);
        Self { task, due_status }
    }
}

#[derive(Serialize, Debug)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
    /// Counts cover every matching task, not just the returned page.
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}
