use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use cmis_server::config::Settings;
use cmis_server::mail::MemoryMailer;
use cmis_server::store::{MemoryStore, RecordStore, UserStore};
use cmis_server::{app, signing_key, AppState};

const SECRET: &str = "integration-test-secret-that-is-long-enough";

struct Page {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

/// Minimal browser: keeps cookies between requests and can follow redirects.
struct Browser {
    app: Router,
    cookies: HashMap<String, String>,
}

impl Browser {
    fn new(app: Router) -> Self {
        Self {
            app,
            cookies: HashMap::new(),
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    async fn send(&mut self, request: Request<Body>) -> Page {
        let response = self.app.clone().oneshot(request).await.unwrap();
        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let pair = set_cookie.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() || set_cookie.contains("Max-Age=0") {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|value| value.to_str().unwrap().to_string());
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        Page {
            status,
            location,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    async fn get(&mut self, path: &str) -> Page {
        let request = Request::builder()
            .uri(path)
            .header(header::COOKIE, self.cookie_header())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn post(&mut self, path: &str, fields: &[(&str, &str)]) -> Page {
        let body = fields
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::COOKIE, self.cookie_header())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Follows a redirect response and returns the page it lands on.
    async fn follow(&mut self, page: Page) -> Page {
        assert_eq!(page.status, StatusCode::SEE_OTHER, "expected a redirect");
        let location = page.location.expect("redirect without location");
        self.get(&location).await
    }

    async fn register(&mut self, email: &str, password: &str) -> Page {
        let page = self
            .post(
                "/register",
                &[
                    ("email", email),
                    ("password", password),
                    ("confirm_password", password),
                ],
            )
            .await;
        self.follow(page).await
    }

    async fn login(&mut self, email: &str, password: &str) -> Page {
        let page = self
            .post("/login", &[("email", email), ("password", password)])
            .await;
        self.follow(page).await
    }
}

struct Harness {
    browser: Browser,
    store: Arc<MemoryStore>,
    mailer: Arc<MemoryMailer>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(MemoryMailer::new());
    let state = AppState::new(store.clone(), mailer.clone(), Settings::default());
    Harness {
        browser: Browser::new(app(state, signing_key(SECRET))),
        store,
        mailer,
    }
}

fn token_from(body: &str) -> String {
    let start = body.find("/reset_password/").unwrap() + "/reset_password/".len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}

#[tokio::test]
async fn protected_pages_send_visitors_to_login() {
    let mut h = harness();
    for path in ["/dashboard", "/marks", "/courses", "/fees", "/logout"] {
        let page = h.browser.get(path).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER, "{}", path);
        assert_eq!(page.location.as_deref(), Some("/"));
        let landing = h.browser.follow(page).await;
        assert!(landing.body.contains("Please login to access this page."));
    }

    let page = h.browser.post("/courses", &[("name", "Sneaky")]).await;
    assert_eq!(page.location.as_deref(), Some("/"));
    assert!(h.store.list_courses().await.unwrap().is_empty());
}

#[tokio::test]
async fn notices_show_once() {
    let mut h = harness();
    let page = h.browser.get("/dashboard").await;
    let landing = h.browser.follow(page).await;
    assert!(landing.body.contains("Please login"));
    let again = h.browser.get("/").await;
    assert!(!again.body.contains("Please login"));
}

#[tokio::test]
async fn register_login_reset_scenario() {
    let mut h = harness();

    let page = h.browser.register("alice@example.com", "pw123").await;
    assert!(page.body.contains("Registration successful! Please login."));

    let page = h.browser.login("alice@example.com", "pw123").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Login successful!"));
    assert!(page.body.contains("alice@example.com"));

    let page = h
        .browser
        .post("/reset_request", &[("email", "alice@example.com")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("A password reset link has been sent"));

    let user = h.store.find_by_email("alice@example.com").await.unwrap().unwrap();
    let expiry = user.token_expiry.unwrap();
    let lifetime = expiry - chrono::Utc::now();
    assert!(lifetime > chrono::Duration::minutes(59) && lifetime <= chrono::Duration::hours(1));

    let sent = h.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    let token = token_from(&sent[0].body);
    assert_eq!(Some(token.clone()), user.reset_token);

    let reset_path = format!("/reset_password/{}", token);
    let page = h.browser.get(&reset_path).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Choose a new password"));

    let page = h
        .browser
        .post(&reset_path, &[("password", "pw456"), ("confirm_password", "pw456")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Password reset successfully! Please login."));

    let page = h.browser.login("alice@example.com", "pw123").await;
    assert!(page.body.contains("Invalid password!"));
    let page = h.browser.login("alice@example.com", "pw456").await;
    assert!(page.body.contains("Login successful!"));

    let page = h
        .browser
        .post(&reset_path, &[("password", "pw789"), ("confirm_password", "pw789")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Invalid or expired token!"));
    let page = h.browser.get(&reset_path).await;
    assert_eq!(page.location.as_deref(), Some("/"));
}

#[tokio::test]
async fn mismatched_reset_returns_to_the_form() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    h.browser
        .post("/reset_request", &[("email", "alice@example.com")])
        .await;
    let token = token_from(&h.mailer.sent().await[0].body);
    let reset_path = format!("/reset_password/{}", token);

    let page = h
        .browser
        .post(&reset_path, &[("password", "pw456"), ("confirm_password", "pw457")])
        .await;
    assert_eq!(page.location.as_deref(), Some(reset_path.as_str()));
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Passwords do not match!"));
}

#[tokio::test]
async fn unknown_email_is_disclosed_by_default() {
    let mut h = harness();
    let page = h
        .browser
        .post("/reset_request", &[("email", "nobody@example.com")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Email not found!"));
    assert!(h.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn duplicate_registration_is_refused() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    let page = h.browser.register("alice@example.com", "other").await;
    assert!(page.body.contains("User is already registered. Please login to the application."));

    let page = h.browser.login("alice@example.com", "pw123").await;
    assert!(page.body.contains("Login successful!"));
}

#[tokio::test]
async fn failed_login_opens_no_session() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;

    let page = h.browser.login("alice@example.com", "wrong").await;
    assert!(page.body.contains("Invalid password!"));
    let page = h.browser.login("bob@example.com", "pw123").await;
    assert!(page.body.contains("User not found!"));

    let page = h.browser.get("/dashboard").await;
    assert_eq!(page.location.as_deref(), Some("/"));
}

#[tokio::test]
async fn forged_session_cookie_is_rejected() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    h.browser.login("alice@example.com", "pw123").await;

    let forged = h
        .browser
        .cookies
        .get("cmis_session")
        .unwrap()
        .chars()
        .rev()
        .collect::<String>();
    h.browser.cookies.insert("cmis_session".to_string(), forged);
    let page = h.browser.get("/dashboard").await;
    assert_eq!(page.location.as_deref(), Some("/"));
}

#[tokio::test]
async fn logout_ends_the_session() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    h.browser.login("alice@example.com", "pw123").await;

    let stale = h.browser.cookies.clone();
    let page = h.browser.get("/logout").await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("You have been logged out."));

    // the old cookie no longer opens anything
    h.browser.cookies = stale;
    let page = h.browser.get("/dashboard").await;
    assert_eq!(page.location.as_deref(), Some("/"));
    let page = h.browser.get("/logout").await;
    assert_eq!(page.location.as_deref(), Some("/"));
}

#[tokio::test]
async fn records_can_be_managed() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    h.browser.login("alice@example.com", "pw123").await;

    let page = h
        .browser
        .post("/courses", &[("name", "CS102"), ("description", "Advanced CS")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Course added successfully!"));
    assert!(page.body.contains("Advanced CS"));

    let page = h
        .browser
        .post(
            "/marks",
            &[
                ("name", "Jane Doe"),
                ("course_id", "1"),
                ("math_mark", "80"),
                ("physics_mark", "85"),
                ("chemistry_mark", "90"),
            ],
        )
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Student and marks added successfully!"));
    assert!(page.body.contains("Jane Doe"));

    let page = h
        .browser
        .post(
            "/fees",
            &[("student_id", "1"), ("amount_paid", "6000"), ("balance_due", "1500")],
        )
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Fee record added successfully!"));
    assert!(page.body.contains("1500.00"));

    let page = h.browser.get("/dashboard").await;
    assert!(page.body.contains("Total students: 1"));
    assert!(page.body.contains("Fees due: 1500.00"));

    // fee records keep the student in place
    let page = h
        .browser
        .post("/marks", &[("delete", "1"), ("student_id", "1")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Student still has fee records"));
    assert_eq!(h.store.list_student_marks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_student_drops_their_marks() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    h.browser.login("alice@example.com", "pw123").await;
    h.browser
        .post("/courses", &[("name", "CS101"), ("description", "")])
        .await;
    h.browser
        .post(
            "/marks",
            &[
                ("name", "John Doe"),
                ("course_id", "1"),
                ("math_mark", "90"),
                ("physics_mark", "85"),
                ("chemistry_mark", "88"),
            ],
        )
        .await;

    let page = h
        .browser
        .post("/marks", &[("delete", "1"), ("student_id", "1")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Student and their marks deleted successfully!"));
    assert!(h.store.list_student_marks().await.unwrap().is_empty());
    assert_eq!(h.store.dashboard_totals().await.unwrap().students, 0);
}

#[tokio::test]
async fn invalid_forms_come_back_with_a_notice() {
    let mut h = harness();
    h.browser.register("alice@example.com", "pw123").await;
    h.browser.login("alice@example.com", "pw123").await;

    let page = h
        .browser
        .post("/marks", &[("name", "Jane"), ("course_id", "abc")])
        .await;
    assert_eq!(page.location.as_deref(), Some("/marks"));
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("`course_id` is not a valid number!"));

    let page = h
        .browser
        .post("/fees", &[("student_id", "99"), ("amount_paid", "1"), ("balance_due", "1")])
        .await;
    let page = h.browser.follow(page).await;
    assert!(page.body.contains("Student does not exist!"));
}

#[tokio::test]
async fn unknown_paths_render_not_found() {
    let mut h = harness();
    let page = h.browser.get("/nowhere").await;
    assert_eq!(page.status, StatusCode::NOT_FOUND);
    assert!(page.body.contains("Page not found"));
}

#[tokio::test]
async fn unreadable_form_bodies_come_back_with_a_notice() {
    let mut h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .body(Body::from("email=alice%40example.com&password=pw123"))
        .unwrap();
    let page = h.browser.send(request).await;
    assert_eq!(page.status, StatusCode::SEE_OTHER);
    assert_eq!(page.location.as_deref(), Some("/"));
    let landing = h.browser.follow(page).await;
    assert!(landing.body.contains("The form could not be read."));

    h.browser.register("alice@example.com", "pw123").await;
    h.browser.login("alice@example.com", "pw123").await;
    let request = Request::builder()
        .method("POST")
        .uri("/courses")
        .header(header::COOKIE, h.browser.cookie_header())
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("name=Physics"))
        .unwrap();
    let page = h.browser.send(request).await;
    assert_eq!(page.location.as_deref(), Some("/courses"));
    assert!(h.store.list_courses().await.unwrap().is_empty());
}
