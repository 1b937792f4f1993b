mod user;
mod forms;
mod task;

pub use user::{User, UserView};
pub use forms::{
    LoginForm, RegisterForm, ResetTimeForm, ProfileUpdateForm,
    CreateTaskForm, UpdateTaskForm, TaskListQuery, BulkTaskIds, BulkPriorityForm,
};
pub use task::{Task, TaskView, TaskListResponse, DueStatus, PRIORITY_LOW, PRIORITY_HIGH};
