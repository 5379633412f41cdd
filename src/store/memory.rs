use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{token_is_live, RecordStore, SessionStore, TokenStatus, UserStore};
use crate::err::{Error, Result};
use crate::models::{
    Course, DashboardTotals, Fee, NewCourse, NewFee, NewStudent, Role, Student, StudentMarks,
    UserData, UserSession, SUBJECTS,
};

#[derive(Debug, Clone)]
struct MarkRow {
    student_id: i32,
    subject: String,
    mark: i32,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserData>,
    sessions: HashMap<String, UserSession>,
    courses: BTreeMap<i32, Course>,
    students: BTreeMap<i32, Student>,
    marks: Vec<MarkRow>,
    fees: BTreeMap<i32, Fee>,
    next_course: i32,
    next_student: i32,
    next_fee: i32,
}

impl Tables {
    fn next_id(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }

    fn user_with_token(&mut self, token: &str) -> Option<&mut UserData> {
        self.users
            .iter_mut()
            .find(|user| user.reset_token.as_deref() == Some(token))
    }
}

/// Store that keeps every table in process memory. Each call holds the lock
/// for its whole duration, which makes every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_reference(what: &str) -> Error {
    Error::ConstraintViolation {
        message: format!("{} does not exist!", what),
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, email: &str, password_hash: &str, role: Role) -> Result<UserData> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|user| user.email == email) {
            return Err(Error::UserAlreadyExists {
                message: "User is already registered. Please login to the application."
                    .to_string(),
            });
        }
        let user = UserData {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: role.as_str().to_string(),
            reset_token: None,
            token_expiry: None,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserData>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserData>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .iter()
            .any(|user| user.id != user_id && user.reset_token.as_deref() == Some(token))
        {
            return Err(Error::internal("DatabaseError", "duplicate reset token"));
        }
        let user = tables
            .users
            .iter_mut()
            .find(|user| user.id == user_id)
            .ok_or_else(|| Error::UserDoesNotExist {
                message: format!("User with id `{}` does not exist!", user_id),
            })?;
        user.reset_token = Some(token.to_string());
        user.token_expiry = Some(expiry);
        Ok(())
    }

    async fn clear_reset_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.user_with_token(token) {
            Some(user) if user.id == user_id => {
                user.reset_token = None;
                user.token_expiry = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn inspect_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<TokenStatus> {
        let mut tables = self.tables.lock().await;
        let user = match tables.user_with_token(token) {
            Some(user) => user,
            None => return Ok(TokenStatus::Unknown),
        };
        if token_is_live(user.token_expiry, now) {
            return Ok(TokenStatus::Active { user_id: user.id });
        }
        user.reset_token = None;
        user.token_expiry = None;
        Ok(TokenStatus::Expired)
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenStatus> {
        let mut tables = self.tables.lock().await;
        let user = match tables.user_with_token(token) {
            Some(user) => user,
            None => return Ok(TokenStatus::Unknown),
        };
        let live = token_is_live(user.token_expiry, now);
        user.reset_token = None;
        user.token_expiry = None;
        if !live {
            return Ok(TokenStatus::Expired);
        }
        user.password_hash = new_password_hash.to_string();
        Ok(TokenStatus::Active { user_id: user.id })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &UserSession) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|user| user.id == session.belongs_to) {
            return Err(missing_reference("User"));
        }
        tables
            .sessions
            .insert(session.ssid.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, ssid: &str) -> Result<Option<UserSession>> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.get(ssid).cloned())
    }

    async fn delete_session(&self, ssid: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables.sessions.remove(ssid).is_some())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| session.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn dashboard_totals(&self) -> Result<DashboardTotals> {
        let tables = self.tables.lock().await;
        Ok(DashboardTotals {
            students: tables.students.len() as i64,
            courses: tables.courses.len() as i64,
            fees_due: tables.fees.values().map(|fee| fee.balance_due).sum(),
        })
    }

    async fn list_student_marks(&self) -> Result<Vec<StudentMarks>> {
        let tables = self.tables.lock().await;
        let mark_for = |student_id: i32, subject: &str| {
            tables
                .marks
                .iter()
                .filter(|row| row.student_id == student_id && row.subject == subject)
                .map(|row| row.mark)
                .max()
        };
        Ok(tables
            .students
            .values()
            .map(|student| StudentMarks {
                student_id: student.student_id,
                name: student.name.clone(),
                course_id: student.course_id,
                math_mark: mark_for(student.student_id, SUBJECTS[0]),
                physics_mark: mark_for(student.student_id, SUBJECTS[1]),
                chemistry_mark: mark_for(student.student_id, SUBJECTS[2]),
            })
            .collect())
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        let tables = self.tables.lock().await;
        Ok(tables.students.values().cloned().collect())
    }

    async fn add_student_with_marks(&self, student: &NewStudent) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        if !tables.courses.contains_key(&student.course_id) {
            return Err(missing_reference("Course"));
        }
        let student_id = Tables::next_id(&mut tables.next_student);
        tables.students.insert(
            student_id,
            Student {
                student_id,
                name: student.name.clone(),
                course_id: Some(student.course_id),
            },
        );
        for (subject, mark) in SUBJECTS.iter().zip(student.marks) {
            tables.marks.push(MarkRow {
                student_id,
                subject: subject.to_string(),
                mark,
            });
        }
        Ok(student_id)
    }

    async fn delete_student(&self, student_id: i32) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.fees.values().any(|fee| fee.student_id == student_id) {
            return Err(Error::ConstraintViolation {
                message: "Student still has fee records and cannot be deleted.".to_string(),
            });
        }
        tables.marks.retain(|row| row.student_id != student_id);
        Ok(tables.students.remove(&student_id).is_some())
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let tables = self.tables.lock().await;
        Ok(tables.courses.values().cloned().collect())
    }

    async fn add_course(&self, course: &NewCourse) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        let course_id = Tables::next_id(&mut tables.next_course);
        tables.courses.insert(
            course_id,
            Course {
                course_id,
                name: course.name.clone(),
                description: course.description.clone(),
            },
        );
        Ok(course_id)
    }

    async fn list_fees(&self) -> Result<Vec<Fee>> {
        let tables = self.tables.lock().await;
        Ok(tables.fees.values().cloned().collect())
    }

    async fn add_fee(&self, fee: &NewFee) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        if !tables.students.contains_key(&fee.student_id) {
            return Err(missing_reference("Student"));
        }
        let fee_id = Tables::next_id(&mut tables.next_fee);
        tables.fees.insert(
            fee_id,
            Fee {
                fee_id,
                student_id: fee.student_id,
                amount_paid: fee.amount_paid,
                balance_due: fee.balance_due,
            },
        );
        Ok(fee_id)
    }

    async fn seed_sample_data(&self) -> Result<()> {
        if !self.list_courses().await?.is_empty() || !self.list_students().await?.is_empty() {
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
        Ok(())
    }
}
