//! Server-rendered pages.
use std::fmt::Write;

use axum::response::Html;

use crate::models::{Course, DashboardTotals, Fee, Student, StudentMarks};

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn layout(title: &str, notice: Option<&str>, signed_in: bool, content: &str) -> Html<String> {
    let nav = if signed_in {
        r#"<nav><a href="/dashboard">Dashboard</a> <a href="/marks">Marks</a> <a href="/courses">Courses</a> <a href="/fees">Fees</a> <a href="/logout">Logout</a></nav>"#
    } else {
        r#"<nav><a href="/">Login</a> <a href="/register">Register</a></nav>"#
    };
    let notice = notice
        .map(|message| format!(r#"<p class="flash">{}</p>"#, escape(message)))
        .unwrap_or_default();
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title} | CMIS</title></head>\n<body>\n{nav}\n<h1>{title}</h1>\n{notice}\n{content}\n</body>\n</html>\n",
        title = escape(title),
        nav = nav,
        notice = notice,
        content = content,
    ))
}

pub fn login_page(notice: Option<&str>) -> Html<String> {
    layout(
        "Login",
        notice,
        false,
        r#"<form method="post" action="/login">
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Login</button>
</form>
<p><a href="/reset_request">Forgot your password?</a></p>"#,
    )
}

pub fn register_page(notice: Option<&str>) -> Html<String> {
    layout(
        "Register",
        notice,
        false,
        r#"<form method="post" action="/register">
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password" required></label>
<label>Confirm password <input type="password" name="confirm_password" required></label>
<button type="submit">Register</button>
</form>"#,
    )
}

pub fn reset_request_page(notice: Option<&str>) -> Html<String> {
    layout(
        "Reset password",
        notice,
        false,
        r#"<form method="post" action="/reset_request">
<label>Email <input type="email" name="email" required></label>
<button type="submit">Send reset link</button>
</form>"#,
    )
}

pub fn reset_password_page(notice: Option<&str>, token: &str) -> Html<String> {
    let action = format!("/reset_password/{}", urlencoding::encode(token));
    layout(
        "Choose a new password",
        notice,
        false,
        &format!(
            r#"<form method="post" action="{}">
<label>New password <input type="password" name="password" required></label>
<label>Confirm password <input type="password" name="confirm_password" required></label>
<button type="submit">Reset password</button>
</form>"#,
            escape(&action)
        ),
    )
}

pub fn dashboard(notice: Option<&str>, email: Option<&str>, totals: &DashboardTotals) -> Html<String> {
    let greeting = email
        .map(|email| format!("<p>Signed in as {}</p>", escape(email)))
        .unwrap_or_default();
    layout(
        "Dashboard",
        notice,
        true,
        &format!(
            "{}\n<ul>\n<li>Total students: {}</li>\n<li>Total courses: {}</li>\n<li>Fees due: {:.2}</li>\n</ul>",
            greeting, totals.students, totals.courses, totals.fees_due
        ),
    )
}

fn course_options(courses: &[Course]) -> String {
    courses
        .iter()
        .map(|course| {
            format!(
                r#"<option value="{}">{}</option>"#,
                course.course_id,
                escape(&course.name)
            )
        })
        .collect()
}

pub fn marks_page(notice: Option<&str>, rows: &[StudentMarks], courses: &[Course]) -> Html<String> {
    let mut table = String::from(
        "<table>\n<tr><th>ID</th><th>Name</th><th>Course</th><th>Math</th><th>Physics</th><th>Chemistry</th><th></th></tr>\n",
    );
    for row in rows {
        let _ = write!(
            table,
            r#"<tr><td>{id}</td><td>{name}</td><td>{course}</td><td>{math}</td><td>{physics}</td><td>{chemistry}</td><td><form method="post" action="/marks"><input type="hidden" name="student_id" value="{id}"><button type="submit" name="delete" value="1">Delete</button></form></td></tr>
"#,
            id = row.student_id,
            name = escape(&row.name),
            course = optional(row.course_id),
            math = optional(row.math_mark),
            physics = optional(row.physics_mark),
            chemistry = optional(row.chemistry_mark),
        );
    }
    table.push_str("</table>");

    let form = format!(
        r#"<h2>Add student</h2>
<form method="post" action="/marks">
<label>Name <input name="name" required></label>
<label>Course <select name="course_id">{}</select></label>
<label>Math <input type="number" name="math_mark" min="0" max="100" required></label>
<label>Physics <input type="number" name="physics_mark" min="0" max="100" required></label>
<label>Chemistry <input type="number" name="chemistry_mark" min="0" max="100" required></label>
<button type="submit">Add</button>
</form>"#,
        course_options(courses)
    );
    layout("Marks", notice, true, &format!("{}\n{}", table, form))
}

pub fn courses_page(notice: Option<&str>, courses: &[Course]) -> Html<String> {
    let mut table = String::from("<table>\n<tr><th>ID</th><th>Name</th><th>Description</th></tr>\n");
    for course in courses {
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            course.course_id,
            escape(&course.name),
            escape(&course.description)
        );
    }
    table.push_str("</table>");
    let form = r#"<h2>Add course</h2>
<form method="post" action="/courses">
<label>Name <input name="name" required></label>
<label>Description <input name="description"></label>
<button type="submit">Add</button>
</form>"#;
    layout("Courses", notice, true, &format!("{}\n{}", table, form))
}

pub fn fees_page(notice: Option<&str>, fees: &[Fee], students: &[Student]) -> Html<String> {
    let mut table = String::from(
        "<table>\n<tr><th>ID</th><th>Student</th><th>Amount paid</th><th>Balance due</th></tr>\n",
    );
    for fee in fees {
        let student = students
            .iter()
            .find(|student| student.student_id == fee.student_id)
            .map(|student| escape(&student.name))
            .unwrap_or_else(|| fee.student_id.to_string());
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>",
            fee.fee_id, student, fee.amount_paid, fee.balance_due
        );
    }
    table.push_str("</table>");

    let options: String = students
        .iter()
        .map(|student| {
            format!(
                r#"<option value="{}">{}</option>"#,
                student.student_id,
                escape(&student.name)
            )
        })
        .collect();
    let form = format!(
        r#"<h2>Add fee record</h2>
<form method="post" action="/fees">
<label>Student <select name="student_id">{}</select></label>
<label>Amount paid <input type="number" step="0.01" min="0" name="amount_paid" required></label>
<label>Balance due <input type="number" step="0.01" min="0" name="balance_due" required></label>
<button type="submit">Add</button>
</form>"#,
        options
    );
    layout("Fees", notice, true, &format!("{}\n{}", table, form))
}

pub fn not_found(message: &str) -> Html<String> {
    layout("Page not found", Some(message), false, r#"<p><a href="/">Back to the start page</a></p>"#)
}
