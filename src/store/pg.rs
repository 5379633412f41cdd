use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{token_is_live, RecordStore, SessionStore, TokenStatus, UserStore};
use crate::err::{Error, Result};
use crate::models::{
    Course, DashboardTotals, Fee, NewCourse, NewFee, NewStudent, Role, Student, StudentMarks,
    UserData, UserSession, SUBJECTS,
};

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'User',
        reset_token TEXT UNIQUE,
        token_expiry TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CHECK ((reset_token IS NULL) = (token_expiry IS NULL))
    )",
    "CREATE TABLE IF NOT EXISTS user_sessions (
        ssid TEXT PRIMARY KEY,
        expires_at TIMESTAMPTZ NOT NULL,
        belongs_to UUID NOT NULL REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS courses (
        course_id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS students (
        student_id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        course_id INTEGER REFERENCES courses(course_id)
    )",
    "CREATE TABLE IF NOT EXISTS subject_marks (
        mark_id SERIAL PRIMARY KEY,
        student_id INTEGER NOT NULL REFERENCES students(student_id),
        subject TEXT NOT NULL,
        mark INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS fees (
        fee_id SERIAL PRIMARY KEY,
        student_id INTEGER NOT NULL REFERENCES students(student_id),
        amount_paid DOUBLE PRECISION NOT NULL,
        balance_due DOUBLE PRECISION NOT NULL
    )",
];

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        log::info!("Database schema is up to date");
        Ok(())
    }

    /// Locks the token's row, clears it when expired and, if `new_password_hash`
    /// is given and the token is live, consumes it.
    async fn settle_token(
        &self,
        token: &str,
        new_password_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenStatus> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(Uuid, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT id, token_expiry FROM users WHERE reset_token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut tx)
        .await?;

        let (user_id, expiry) = match row {
            Some(row) => row,
            None => return Ok(TokenStatus::Unknown),
        };

        if !token_is_live(expiry, now) {
            sqlx::query("UPDATE users SET reset_token = NULL, token_expiry = NULL WHERE id = $1")
                .bind(user_id)
                .execute(&mut tx)
                .await?;
            tx.commit().await?;
            return Ok(TokenStatus::Expired);
        }

        if let Some(hash) = new_password_hash {
            sqlx::query(
                "UPDATE users SET password_hash = $1, reset_token = NULL, token_expiry = NULL WHERE id = $2",
            )
            .bind(hash)
            .bind(user_id)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(TokenStatus::Active { user_id })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, email: &str, password_hash: &str, role: Role) -> Result<UserData> {
        let user = sqlx::query_as::<_, UserData>(
            "INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserData>> {
        let user = sqlx::query_as::<_, UserData>("SELECT * FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserData>> {
        let user = sqlx::query_as::<_, UserData>("SELECT * FROM users WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        let res = sqlx::query("UPDATE users SET reset_token = $1, token_expiry = $2 WHERE id = $3")
            .bind(token)
            .bind(expiry)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::internal("DatabaseError", err.to_string()))?;

        if res.rows_affected() < 1 {
            return Err(Error::UserDoesNotExist {
                message: format!("User with id `{}` does not exist!", user_id),
            });
        }
        Ok(())
    }

    async fn clear_reset_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET reset_token = NULL, token_expiry = NULL WHERE id = $1 AND reset_token = $2",
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn inspect_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<TokenStatus> {
        self.settle_token(token, None, now).await
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenStatus> {
        self.settle_token(token, Some(new_password_hash), now).await
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: &UserSession) -> Result<()> {
        let res = sqlx::query("INSERT INTO user_sessions VALUES($1, $2, $3)")
            .bind(&session.ssid)
            .bind(session.expires_at)
            .bind(session.belongs_to)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() < 1 {
            return Err(Error::internal(
                "DatabaseError",
                "Could not update session ids!",
            ));
        }
        Ok(())
    }

    async fn find_session(&self, ssid: &str) -> Result<Option<UserSession>> {
        let session = sqlx::query_as::<_, UserSession>(
            "SELECT * FROM user_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, ssid: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pool)
            .await?;
        Ok(affected.rows_affected() >= 1)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn dashboard_totals(&self) -> Result<DashboardTotals> {
        let (students, courses, fees_due): (i64, i64, f64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM students),
                    (SELECT COUNT(*) FROM courses),
                    (SELECT COALESCE(SUM(balance_due), 0) FROM fees)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(DashboardTotals {
            students,
            courses,
            fees_due,
        })
    }

    async fn list_student_marks(&self) -> Result<Vec<StudentMarks>> {
        let rows = sqlx::query_as::<_, StudentMarks>(
            "SELECT s.student_id, s.name, s.course_id,
                    MAX(CASE WHEN sm.subject = $1 THEN sm.mark END) AS math_mark,
                    MAX(CASE WHEN sm.subject = $2 THEN sm.mark END) AS physics_mark,
                    MAX(CASE WHEN sm.subject = $3 THEN sm.mark END) AS chemistry_mark
             FROM students s
             LEFT JOIN subject_marks sm ON s.student_id = sm.student_id
             GROUP BY s.student_id
             ORDER BY s.student_id",
        )
        .bind(SUBJECTS[0])
        .bind(SUBJECTS[1])
        .bind(SUBJECTS[2])
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query_as::<_, Student>(
            "SELECT student_id, name, course_id FROM students ORDER BY student_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_student_with_marks(&self, student: &NewStudent) -> Result<i32> {
        let mut tx = self.pool.begin().await?;
        let (student_id,): (i32,) = sqlx::query_as(
            "INSERT INTO students (name, course_id) VALUES ($1, $2) RETURNING student_id",
        )
        .bind(&student.name)
        .bind(student.course_id)
        .fetch_one(&mut tx)
        .await?;

        for (subject, mark) in SUBJECTS.iter().zip(student.marks) {
            sqlx::query("INSERT INTO subject_marks (student_id, subject, mark) VALUES ($1, $2, $3)")
                .bind(student_id)
                .bind(*subject)
                .bind(mark)
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(student_id)
    }

    async fn delete_student(&self, student_id: i32) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let (fees,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fees WHERE student_id = $1")
            .bind(student_id)
            .fetch_one(&mut tx)
            .await?;
        if fees > 0 {
            return Err(Error::ConstraintViolation {
                message: "Student still has fee records and cannot be deleted.".to_string(),
            });
        }
        sqlx::query("DELETE FROM subject_marks WHERE student_id = $1")
            .bind(student_id)
            .execute(&mut tx)
            .await?;
        let res = sqlx::query("DELETE FROM students WHERE student_id = $1")
            .bind(student_id)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query_as::<_, Course>(
            "SELECT course_id, name, description FROM courses ORDER BY course_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_course(&self, course: &NewCourse) -> Result<i32> {
        let (course_id,): (i32,) = sqlx::query_as(
            "INSERT INTO courses (name, description) VALUES ($1, $2) RETURNING course_id",
        )
        .bind(&course.name)
        .bind(&course.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(course_id)
    }

    async fn list_fees(&self) -> Result<Vec<Fee>> {
        let rows = sqlx::query_as::<_, Fee>(
            "SELECT fee_id, student_id, amount_paid, balance_due FROM fees ORDER BY fee_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_fee(&self, fee: &NewFee) -> Result<i32> {
        let (fee_id,): (i32,) = sqlx::query_as(
            "INSERT INTO fees (student_id, amount_paid, balance_due) VALUES ($1, $2, $3) RETURNING fee_id",
        )
        .bind(fee.student_id)
        .bind(fee.amount_paid)
        .bind(fee.balance_due)
        .fetch_one(&self.pool)
        .await?;
        Ok(fee_id)
    }

    async fn seed_sample_data(&self) -> Result<()> {
        let (existing,): (i64,) =
            sqlx::query_as("SELECT (SELECT COUNT(*) FROM courses) + (SELECT COUNT(*) FROM students)")
                .fetch_one(&self.pool)
                .await?;
        if existing > 0 {
            return Ok(());
        }
        let course_id = self
            .add_course(&NewCourse {
                name: "CS101".to_string(),
                description: "Intro to Computer Science".to_string(),
            })
            .await?;
        let student_id = self
            .add_student_with_marks(&NewStudent {
                name: "John Doe".to_string(),
                course_id,
                marks: [90, 85, 88],
            })
            .await?;
        self.add_fee(&NewFee {
            student_id,
            amount_paid: 5000.0,
            balance_due: 2000.0,
        })
        .await?;
        log::info!("Seeded sample course, student and fee records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    /// Runs against the scratch database in `CMIS_DATABASE_URL`.
    #[tokio::test]
    #[ignore]
    async fn racing_consumers_succeed_once() {
        let url = match std::env::var("CMIS_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return,
        };
        let store = Arc::new(PgStore::connect(&url, 4).await.unwrap());
        store.init_schema().await.unwrap();

        let email = format!("race-{}@example.com", Uuid::new_v4());
        let user = store.insert_user(&email, "old", Role::User).await.unwrap();
        let token = format!("race-{}", Uuid::new_v4());
        let now = Utc::now();
        store
            .set_reset_token(user.id, &token, now + Duration::hours(1))
            .await
            .unwrap();

        let handles: Vec<_> = ["hash-a", "hash-b"]
            .into_iter()
            .map(|hash| {
                let store = store.clone();
                let token = token.clone();
                tokio::spawn(async move { store.consume_reset_token(&token, hash, now).await.unwrap() })
            })
            .collect();
        let mut active = 0;
        for handle in handles {
            if let TokenStatus::Active { .. } = handle.await.unwrap() {
                active += 1;
            }
        }
        assert_eq!(active, 1);

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(user.reset_token.is_none());
        assert!(user.password_hash == "hash-a" || user.password_hash == "hash-b");
    }
}
