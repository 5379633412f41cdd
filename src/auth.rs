//! Registration, login and the session gate.
use async_trait::async_trait;
use axum::extract::{Extension, FromRequest, RequestParts};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::err::{Error, Result};
use crate::models::{Role, UserData, UserSession};
use crate::store::SessionStore;
use crate::web::flash;
use crate::{password, AppState};

pub const SESSION_COOKIE: &str = "cmis_session";
pub const LOGIN_REQUIRED: &str = "Please login to access this page.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub ssid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success(Identity),
    SessionExpired,
    InvalidSession,
}

/// 256 random bits, hashed and hex encoded. Used for session ids and reset tokens.
pub fn random_token() -> String {
    let bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

pub fn session_cookie(ssid: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, ssid)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "").path("/").finish()
}

pub async fn ensure_authenticated(
    sessions: &dyn SessionStore,
    session_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AuthResult> {
    let ssid = match session_id {
        Some(ssid) if !ssid.is_empty() => ssid,
        _ => return Ok(AuthResult::InvalidSession),
    };

    let session = match sessions.find_session(ssid).await? {
        Some(session) => session,
        None => return Ok(AuthResult::InvalidSession),
    };

    if now >= session.expires_at {
        sessions.delete_session(ssid).await?;
        return Ok(AuthResult::SessionExpired);
    }
    Ok(AuthResult::Success(Identity {
        user_id: session.belongs_to,
        ssid: session.ssid,
    }))
}

/// Guard for protected handlers. Taking a `CurrentUser` argument is all a
/// handler needs to be reachable only with a live session; anything else is
/// redirected to the login page with a notice.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<B> FromRequest<B> for CurrentUser
where
    B: Send,
{
    type Rejection = Response;

    async fn from_request(req: &mut RequestParts<B>) -> std::result::Result<Self, Self::Rejection> {
        let Extension(state) = Extension::<AppState>::from_request(req)
            .await
            .map_err(IntoResponse::into_response)?;
        let jar = SignedCookieJar::<Key>::from_request(req)
            .await
            .map_err(IntoResponse::into_response)?;

        let ssid = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());
        match ensure_authenticated(state.sessions.as_ref(), ssid.as_deref(), Utc::now()).await {
            Ok(AuthResult::Success(identity)) => Ok(CurrentUser(identity)),
            Ok(result) => {
                log::debug!("Rejected request to {}: {:?}", req.uri(), result);
                let jar = jar.remove(expired_session_cookie());
                Err(flash::redirect(jar, "/", LOGIN_REQUIRED))
            }
            Err(err) => {
                log::error!("Could not check session: {}", err);
                Err(flash::redirect(jar, "/", err.notice()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub session: UserSession,
    pub user: UserData,
}

pub async fn register(state: &AppState, form: &RegisterForm) -> Result<UserData> {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return Err(Error::invalid("Email and password are required!"));
    }
    if form.password != form.confirm_password {
        return Err(Error::invalid("Passwords do not match!"));
    }

    let hash = password::hash_password(&form.password)?;
    let user = state.users.insert_user(email, &hash, Role::User).await?;
    log::info!("Registered user {} ({})", user.email, user.id);
    Ok(user)
}

pub async fn login(state: &AppState, form: &LoginForm, now: DateTime<Utc>) -> Result<LoggedIn> {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return Err(Error::invalid("Please enter your email and password."));
    }

    let user = match state.users.find_by_email(email).await? {
        Some(user) => user,
        None => {
            password::burn_verification(&form.password);
            return Err(Error::UserDoesNotExist {
                message: "User not found!".to_string(),
            });
        }
    };

    if !password::verify_password(&form.password, &user.password_hash)? {
        return Err(Error::AuthenticationFailure {
            message: "Invalid password!".to_string(),
        });
    }

    let purged = state.sessions.purge_expired_sessions(now).await?;
    if purged > 0 {
        log::debug!("Purged {} expired sessions", purged);
    }

    let session = UserSession {
        ssid: random_token(),
        belongs_to: user.id,
        expires_at: now + state.settings.session_ttl(),
    };
    state.sessions.create_session(&session).await?;
    log::info!("User {} logged in", user.email);
    Ok(LoggedIn { session, user })
}

/// Unbinds the session. Logging out of a session that is already gone is fine.
pub async fn logout(state: &AppState, ssid: &str) -> Result<bool> {
    let dropped = state.sessions.delete_session(ssid).await?;
    if !dropped {
        log::debug!("Session was already gone at logout");
    }
    Ok(dropped)
}
