//! HTTP surface: routes, handlers and page rendering.
use axum::extract::rejection::FormRejection;
use axum::extract::{Extension, Form, Path};
use axum::handler::Handler;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use chrono::Utc;

use crate::auth::{self, CurrentUser, LoginForm, RegisterForm};
use crate::err::{self, Error};
use crate::records::{self, CourseForm, FeeForm, MarksForm};
use crate::reset::{self, ResetPasswordForm, ResetRequestForm};
use crate::AppState;

pub mod flash;
pub mod views;

pub fn app(state: AppState, key: Key) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/register", get(register_page).post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .route("/reset_request", get(reset_request_page).post(reset_request))
        .route(
            "/reset_password/:token",
            get(reset_password_page).post(reset_password),
        )
        .route("/marks", get(marks_page).post(marks))
        .route("/courses", get(courses_page).post(courses))
        .route("/fees", get(fees_page).post(fees))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
        .layer(Extension(key))
}

/// Logs a handled failure and sends the user to `to` with its notice.
fn failure(jar: SignedCookieJar, to: &str, err: Error) -> Response {
    if err.is_internal() {
        log::error!("Request failed: {}", err);
    } else {
        log::warn!("Request rejected: {}", err);
    }
    flash::redirect(jar, to, err.notice())
}

fn submitted<T>(payload: Result<Form<T>, FormRejection>) -> Result<T, Error> {
    payload.map(|Form(form)| form).map_err(|rejection| {
        log::debug!("Unreadable form submission: {}", rejection);
        Error::invalid("The form could not be read. Please try again.")
    })
}

async fn home(jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, notice) = flash::take(jar);
    (jar, views::login_page(notice.as_deref()))
}

async fn register_page(jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, notice) = flash::take(jar);
    (jar, views::register_page(notice.as_deref()))
}

async fn register(
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<RegisterForm>, FormRejection>,
) -> Response {
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, "/register", err),
    };
    match auth::register(&state, &form).await {
        Ok(_) => flash::redirect(jar, "/", "Registration successful! Please login."),
        Err(err) => failure(jar, "/register", err),
    }
}

async fn login(
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, "/", err),
    };
    match auth::login(&state, &form, Utc::now()).await {
        Ok(logged_in) => {
            let jar = jar.add(auth::session_cookie(logged_in.session.ssid));
            flash::redirect(jar, "/dashboard", "Login successful!")
        }
        Err(err) => failure(jar, "/", err),
    }
}

async fn logout(
    CurrentUser(identity): CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
) -> Response {
    if let Err(err) = auth::logout(&state, &identity.ssid).await {
        log::error!("Could not drop session of {}: {}", identity.user_id, err);
    }
    let jar = jar.remove(auth::expired_session_cookie());
    flash::redirect(jar, "/", "You have been logged out.")
}

async fn dashboard(
    CurrentUser(identity): CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
) -> Response {
    let (jar, notice) = flash::take(jar);
    let user = match state.users.find_by_id(identity.user_id).await {
        Ok(user) => user,
        Err(err) => return failure(jar, "/", err),
    };
    match state.records.dashboard_totals().await {
        Ok(totals) => (
            jar,
            views::dashboard(
                notice.as_deref(),
                user.as_ref().map(|user| user.email.as_str()),
                &totals,
            ),
        )
            .into_response(),
        Err(err) => failure(jar, "/", err),
    }
}

async fn reset_request_page(jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, notice) = flash::take(jar);
    (jar, views::reset_request_page(notice.as_deref()))
}

async fn reset_request(
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<ResetRequestForm>, FormRejection>,
) -> Response {
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, "/reset_request", err),
    };
    match reset::request_reset(&state, &form.email, Utc::now()).await {
        Ok(outcome) => flash::redirect(
            jar,
            "/reset_request",
            outcome.notice(state.settings.uniform_reset_response),
        ),
        Err(err) => failure(jar, "/reset_request", err),
    }
}

async fn reset_password_page(
    Path(token): Path<String>,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
) -> Response {
    let (jar, notice) = flash::take(jar);
    match reset::check_token(&state, &token, Utc::now()).await {
        Ok(()) => (jar, views::reset_password_page(notice.as_deref(), &token)).into_response(),
        Err(err) => failure(jar, "/", err),
    }
}

async fn reset_password(
    Path(token): Path<String>,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<ResetPasswordForm>, FormRejection>,
) -> Response {
    let back = format!("/reset_password/{}", urlencoding::encode(&token));
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, &back, err),
    };
    match reset::reset_password(&state, &token, &form, Utc::now()).await {
        Ok(_) => flash::redirect(jar, "/", "Password reset successfully! Please login."),
        Err(err @ Error::InvalidPayload { .. }) => failure(jar, &back, err),
        Err(err) => failure(jar, "/", err),
    }
}

async fn marks_page(
    _user: CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
) -> Response {
    let (jar, notice) = flash::take(jar);
    let rows = match state.records.list_student_marks().await {
        Ok(rows) => rows,
        Err(err) => return failure(jar, "/dashboard", err),
    };
    match state.records.list_courses().await {
        Ok(courses) => (jar, views::marks_page(notice.as_deref(), &rows, &courses)).into_response(),
        Err(err) => failure(jar, "/dashboard", err),
    }
}

async fn marks(
    _user: CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<MarksForm>, FormRejection>,
) -> Response {
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, "/marks", err),
    };
    match records::submit_marks(state.records.as_ref(), &form).await {
        Ok(notice) => flash::redirect(jar, "/marks", notice),
        Err(err) => failure(jar, "/marks", err),
    }
}

async fn courses_page(
    _user: CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
) -> Response {
    let (jar, notice) = flash::take(jar);
    match state.records.list_courses().await {
        Ok(courses) => (jar, views::courses_page(notice.as_deref(), &courses)).into_response(),
        Err(err) => failure(jar, "/dashboard", err),
    }
}

async fn courses(
    _user: CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<CourseForm>, FormRejection>,
) -> Response {
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, "/courses", err),
    };
    match records::submit_course(state.records.as_ref(), &form).await {
        Ok(notice) => flash::redirect(jar, "/courses", notice),
        Err(err) => failure(jar, "/courses", err),
    }
}

async fn fees_page(
    _user: CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
) -> Response {
    let (jar, notice) = flash::take(jar);
    let fees = match state.records.list_fees().await {
        Ok(fees) => fees,
        Err(err) => return failure(jar, "/dashboard", err),
    };
    match state.records.list_students().await {
        Ok(students) => (jar, views::fees_page(notice.as_deref(), &fees, &students)).into_response(),
        Err(err) => failure(jar, "/dashboard", err),
    }
}

async fn fees(
    _user: CurrentUser,
    Extension(state): Extension<AppState>,
    jar: SignedCookieJar,
    form: Result<Form<FeeForm>, FormRejection>,
) -> Response {
    let form = match submitted(form) {
        Ok(form) => form,
        Err(err) => return failure(jar, "/fees", err),
    };
    match records::submit_fee(state.records.as_ref(), &form).await {
        Ok(notice) => flash::redirect(jar, "/fees", notice),
        Err(err) => failure(jar, "/fees", err),
    }
}
