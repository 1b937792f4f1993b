use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,  // bcrypt hash, never the plain password
    pub reset_hour: u32,        // 0-23, UTC
    pub reset_minute: u32,      // 0-59
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// What the API returns for a user; leaves the password hash out.
#[derive(Debug, Serialize, Clone)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub reset_hour: u32,
    pub reset_minute: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            reset_hour: user.reset_hour,
            reset_minute: user.reset_minute,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
