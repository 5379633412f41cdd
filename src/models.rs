use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Role::User),
            "Admin" => Ok(Role::Admin),
            other => Err(format!("unknown role `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserData {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub reset_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserData {
    /// Rows written by older deployments may carry roles we no longer know.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSession {
    pub ssid: String,
    pub belongs_to: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Course {
    pub course_id: i32,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Student {
    pub student_id: i32,
    pub name: String,
    pub course_id: Option<i32>,
}

/// One row of the marks sheet: a student with their per-subject marks.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudentMarks {
    pub student_id: i32,
    pub name: String,
    pub course_id: Option<i32>,
    pub math_mark: Option<i32>,
    pub physics_mark: Option<i32>,
    pub chemistry_mark: Option<i32>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Fee {
    pub fee_id: i32,
    pub student_id: i32,
    pub amount_paid: f64,
    pub balance_due: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardTotals {
    pub students: i64,
    pub courses: i64,
    pub fees_due: f64,
}

pub const SUBJECTS: [&str; 3] = ["Math", "Physics", "Chemistry"];

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub course_id: i32,
    /// Marks in the order of [`SUBJECTS`].
    pub marks: [i32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCourse {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFee {
    pub student_id: i32,
    pub amount_paid: f64,
    pub balance_due: f64,
}
