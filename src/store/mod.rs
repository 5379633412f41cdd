//! Persistence seams. Every operation is implemented twice: against
//! PostgreSQL ([`PgStore`]) and in process memory ([`MemoryStore`]).
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::err::Result;
use crate::models::{
    Course, DashboardTotals, Fee, NewCourse, NewFee, NewStudent, Role, Student, StudentMarks,
    UserData, UserSession,
};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// State of a presented reset token after the store has looked at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Matched a user and was still within its lifetime.
    Active { user_id: Uuid },
    /// Matched a user but had run out; it has been cleared.
    Expired,
    /// Matched nobody.
    Unknown,
}

/// A token is live strictly before its expiry instant.
pub fn token_is_live(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expiry, Some(expiry) if now < expiry)
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `UserAlreadyExists` when the email is taken.
    async fn insert_user(&self, email: &str, password_hash: &str, role: Role) -> Result<UserData>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserData>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserData>>;

    /// Stores a pending token, replacing any earlier one.
    async fn set_reset_token(&self, user_id: Uuid, token: &str, expiry: DateTime<Utc>)
        -> Result<()>;

    /// Clears the user's token only if it is still `token`.
    async fn clear_reset_token(&self, user_id: Uuid, token: &str) -> Result<bool>;

    /// Looks a token up without using it. An expired token is cleared.
    async fn inspect_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<TokenStatus>;

    /// Atomically checks the token and, if live, replaces the password hash
    /// and clears the token. Of two racing calls at most one sees `Active`.
    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenStatus>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &UserSession) -> Result<()>;

    async fn find_session(&self, ssid: &str) -> Result<Option<UserSession>>;

    /// Returns whether a session was removed. Missing sessions are not an error.
    async fn delete_session(&self, ssid: &str) -> Result<bool>;

    /// Drops every session that expired at or before `now`.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn dashboard_totals(&self) -> Result<DashboardTotals>;

    async fn list_student_marks(&self) -> Result<Vec<StudentMarks>>;

    async fn list_students(&self) -> Result<Vec<Student>>;

    /// Inserts the student and one mark row per subject as one unit.
    async fn add_student_with_marks(&self, student: &NewStudent) -> Result<i32>;

    /// Deletes the student's marks and then the student as one unit.
    async fn delete_student(&self, student_id: i32) -> Result<bool>;

    async fn list_courses(&self) -> Result<Vec<Course>>;

    async fn add_course(&self, course: &NewCourse) -> Result<i32>;

    async fn list_fees(&self) -> Result<Vec<Fee>>;

    async fn add_fee(&self, fee: &NewFee) -> Result<i32>;

    /// Fills empty tables with a small demonstration data set.
    async fn seed_sample_data(&self) -> Result<()>;
}
