use std::str::FromStr;

use serde::Deserialize;

use crate::err::{Error, Result};
use crate::models::{NewCourse, NewFee, NewStudent};
use crate::store::RecordStore;

pub const MAX_MARK: i32 = 100;

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::invalid(format!("`{}` is required!", field)));
    }
    Ok(value)
}

fn parse_field<T: FromStr>(value: &str, field: &str) -> Result<T> {
    required(value, field)?
        .parse()
        .map_err(|_| Error::invalid(format!("`{}` is not a valid number!", field)))
}

fn parse_mark(value: &str, field: &str) -> Result<i32> {
    let mark: i32 = parse_field(value, field)?;
    if !(0..=MAX_MARK).contains(&mark) {
        return Err(Error::invalid(format!(
            "`{}` must be between 0 and {}!",
            field, MAX_MARK
        )));
    }
    Ok(mark)
}

fn parse_amount(value: &str, field: &str) -> Result<f64> {
    let amount: f64 = parse_field(value, field)?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::invalid(format!("`{}` must be a positive amount!", field)));
    }
    Ok(amount)
}

/// Body of a POST to `/marks`. The presence of `delete` selects deletion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarksForm {
    #[serde(default)]
    pub delete: Option<String>,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub math_mark: String,
    #[serde(default)]
    pub physics_mark: String,
    #[serde(default)]
    pub chemistry_mark: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarksAction {
    Add(NewStudent),
    Delete(i32),
}

impl MarksForm {
    pub fn action(&self) -> Result<MarksAction> {
        if self.delete.is_some() {
            return Ok(MarksAction::Delete(parse_field(&self.student_id, "student_id")?));
        }
        Ok(MarksAction::Add(NewStudent {
            name: required(&self.name, "name")?.to_string(),
            course_id: parse_field(&self.course_id, "course_id")?,
            marks: [
                parse_mark(&self.math_mark, "math_mark")?,
                parse_mark(&self.physics_mark, "physics_mark")?,
                parse_mark(&self.chemistry_mark, "chemistry_mark")?,
            ],
        }))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CourseForm {
    pub fn course(&self) -> Result<NewCourse> {
        Ok(NewCourse {
            name: required(&self.name, "name")?.to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeForm {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub amount_paid: String,
    #[serde(default)]
    pub balance_due: String,
}

impl FeeForm {
    pub fn fee(&self) -> Result<NewFee> {
        Ok(NewFee {
            student_id: parse_field(&self.student_id, "student_id")?,
            amount_paid: parse_amount(&self.amount_paid, "amount_paid")?,
            balance_due: parse_amount(&self.balance_due, "balance_due")?,
        })
    }
}

/// Applies a marks form and returns the notice to show.
pub async fn submit_marks(records: &dyn RecordStore, form: &MarksForm) -> Result<&'static str> {
    match form.action()? {
        MarksAction::Add(student) => {
            let id = records.add_student_with_marks(&student).await?;
            log::info!("Added student {} ({}) with marks", student.name, id);
            Ok("Student and marks added successfully!")
        }
        MarksAction::Delete(student_id) => {
            if !records.delete_student(student_id).await? {
                return Err(Error::NotFound {
                    message: "Student not found!".to_string(),
                });
            }
            log::info!("Deleted student {} and their marks", student_id);
            Ok("Student and their marks deleted successfully!")
        }
    }
}

pub async fn submit_course(records: &dyn RecordStore, form: &CourseForm) -> Result<&'static str> {
    let course = form.course()?;
    let id = records.add_course(&course).await?;
    log::info!("Added course {} ({})", course.name, id);
    Ok("Course added successfully!")
}

pub async fn submit_fee(records: &dyn RecordStore, form: &FeeForm) -> Result<&'static str> {
    let fee = form.fee()?;
    let id = records.add_fee(&fee).await?;
    log::info!("Added fee record {} for student {}", id, fee.student_id);
    Ok("Fee record added successfully!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn add_form(name: &str, course_id: &str, marks: [&str; 3]) -> MarksForm {
        MarksForm {
            name: name.to_string(),
            course_id: course_id.to_string(),
            math_mark: marks[0].to_string(),
            physics_mark: marks[1].to_string(),
            chemistry_mark: marks[2].to_string(),
            ..MarksForm::default()
        }
    }

    #[test]
    fn delete_field_selects_deletion() {
        let form = MarksForm {
            delete: Some(String::new()),
            student_id: "4".to_string(),
            name: "ignored".to_string(),
            ..MarksForm::default()
        };
        assert_eq!(form.action().unwrap(), MarksAction::Delete(4));
    }

    #[test]
    fn parses_additions() {
        let form = add_form(" Jane Doe ", "1", ["80", "85", "90"]);
        assert_eq!(
            form.action().unwrap(),
            MarksAction::Add(NewStudent {
                name: "Jane Doe".to_string(),
                course_id: 1,
                marks: [80, 85, 90],
            })
        );
    }

    #[test]
    fn rejects_bad_fields() {
        assert!(add_form("", "1", ["1", "2", "3"]).action().is_err());
        assert!(add_form("Jane", "x", ["1", "2", "3"]).action().is_err());
        assert!(add_form("Jane", "1", ["1", "", "3"]).action().is_err());
        assert!(add_form("Jane", "1", ["1", "2", "101"]).action().is_err());

        let fee = FeeForm {
            student_id: "1".to_string(),
            amount_paid: "-5".to_string(),
            balance_due: "10".to_string(),
        };
        assert!(fee.fee().is_err());
        let fee = FeeForm {
            student_id: "1".to_string(),
            amount_paid: "NaN".to_string(),
            balance_due: "10".to_string(),
        };
        assert!(fee.fee().is_err());
    }

    #[tokio::test]
    async fn submits_through_the_store() {
        let store = MemoryStore::new();
        let notice = submit_course(
            &store,
            &CourseForm {
                name: "CS102".to_string(),
                description: "Advanced CS".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(notice, "Course added successfully!");

        let notice = submit_marks(&store, &add_form("Jane Doe", "1", ["80", "85", "90"]))
            .await
            .unwrap();
        assert_eq!(notice, "Student and marks added successfully!");

        let notice = submit_fee(
            &store,
            &FeeForm {
                student_id: "1".to_string(),
                amount_paid: "6000".to_string(),
                balance_due: "1500".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(notice, "Fee record added successfully!");
        assert_eq!(store.dashboard_totals().await.unwrap().fees_due, 1500.0);
    }

    #[tokio::test]
    async fn deleting_unknown_student_is_reported() {
        let store = MemoryStore::new();
        let form = MarksForm {
            delete: Some("1".to_string()),
            student_id: "9".to_string(),
            ..MarksForm::default()
        };
        let err = submit_marks(&store, &form).await.unwrap_err();
        assert_eq!(err.notice(), "Student not found!");
    }
}
