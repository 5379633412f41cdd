//! Password reset through single-use, time-boxed tokens delivered by email.
//!
//! A user is either without a token or has exactly one pending token. A new
//! request replaces the pending token; a successful reset, an expiry check or
//! (under [`DeliveryFailurePolicy::Rollback`]) a failed delivery clears it.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::random_token;
use crate::config::DeliveryFailurePolicy;
use crate::err::{Error, Result};
use crate::store::TokenStatus;
use crate::AppState;

pub const RESET_SUBJECT: &str = "CMIS Password Reset Request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRequested {
    Sent,
    DeliveryFailed,
    UnknownEmail,
}

impl ResetRequested {
    pub fn notice(&self, uniform: bool) -> &'static str {
        match self {
            ResetRequested::Sent => SENT_NOTICE,
            ResetRequested::UnknownEmail if uniform => SENT_NOTICE,
            ResetRequested::UnknownEmail => "Email not found!",
            ResetRequested::DeliveryFailed => {
                "Failed to send the reset email. Please try again later."
            }
        }
    }
}

const SENT_NOTICE: &str =
    "A password reset link has been sent to your email. Please check your inbox (and spam/junk folder).";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetRequestForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

fn reset_email_body(link: &str, ttl_minutes: i64) -> String {
    format!(
        "Hello,\n\n\
         A password reset was requested for your College Management Information System (CMIS) account.\n\n\
         Open the following link to choose a new password:\n{}\n\n\
         The link expires in {} minutes and works once. If you did not ask for a reset, ignore this email.\n\n\
         CMIS Team\n",
        link, ttl_minutes
    )
}

pub async fn request_reset(
    state: &AppState,
    email: &str,
    now: DateTime<Utc>,
) -> Result<ResetRequested> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::invalid("Please enter your email address."));
    }

    let user = match state.users.find_by_email(email).await? {
        Some(user) => user,
        None => {
            log::warn!("Password reset requested for unknown email {}", email);
            return Ok(ResetRequested::UnknownEmail);
        }
    };

    let token = random_token();
    let expiry = now + state.settings.reset_token_ttl();
    state.users.set_reset_token(user.id, &token, expiry).await?;

    let body = reset_email_body(
        &state.settings.reset_link(&token),
        state.settings.reset_token_ttl_minutes,
    );
    match state.mailer.send(&user.email, RESET_SUBJECT, &body).await {
        Ok(()) => {
            log::info!("Reset token issued for {}, valid until {}", user.email, expiry);
            Ok(ResetRequested::Sent)
        }
        Err(err) => {
            log::error!("Could not deliver reset email to {}: {}", user.email, err);
            if state.settings.delivery_failure == DeliveryFailurePolicy::Rollback {
                state.users.clear_reset_token(user.id, &token).await?;
            }
            Ok(ResetRequested::DeliveryFailed)
        }
    }
}

/// Succeeds while `token` may still be used. Unknown and expired tokens fail
/// the same way; expired ones are cleared on the way.
pub async fn check_token(state: &AppState, token: &str, now: DateTime<Utc>) -> Result<()> {
    match state.users.inspect_reset_token(token, now).await? {
        TokenStatus::Active { .. } => Ok(()),
        TokenStatus::Expired => {
            log::info!("Expired reset token presented and cleared");
            Err(Error::InvalidToken)
        }
        TokenStatus::Unknown => {
            log::warn!("Unknown reset token presented");
            Err(Error::InvalidToken)
        }
    }
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    form: &ResetPasswordForm,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    check_token(state, token, now).await?;

    if form.password.is_empty() {
        return Err(Error::invalid("Please enter a new password."));
    }
    if form.password != form.confirm_password {
        return Err(Error::invalid("Passwords do not match!"));
    }

    let hash = crate::password::hash_password(&form.password)?;
    match state.users.consume_reset_token(token, &hash, now).await? {
        TokenStatus::Active { user_id } => {
            log::info!("Password reset completed for user {}", user_id);
            Ok(user_id)
        }
        status => {
            log::warn!("Reset token lost a race or expired mid-request: {:?}", status);
            Err(Error::InvalidToken)
        }
    }
}
