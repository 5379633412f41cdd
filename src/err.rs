use axum::http::{StatusCode, Uri};
use axum::response::Html;
use thiserror::Error;

use crate::web::views;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub async fn handler404(path: Uri) -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        views::not_found(&format!("Invalid path: {}", path)),
    )
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    InvalidPayload { message: String },
    #[error("{message}")]
    UserAlreadyExists { message: String },
    #[error("{message}")]
    UserDoesNotExist { message: String },
    #[error("{message}")]
    AuthenticationFailure { message: String },
    #[error("stored password hash is not in the expected format")]
    MalformedHash,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("{message}")]
    ConstraintViolation { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{kind}: {message}")]
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &'static str, msg: S) -> Error {
        Error::InternalError {
            kind,
            message: msg.into(),
        }
    }

    /// Text shown to the user in a flash notice.
    pub fn notice(&self) -> String {
        match self {
            Error::MalformedHash => {
                "Login error: your stored password is in an outdated format. Please re-register."
                    .to_string()
            }
            Error::InvalidToken => "Invalid or expired token!".to_string(),
            Error::InternalError { .. } => {
                "Something went wrong while processing your request. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// User-caused failures are logged at a lower level than faults.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::InternalError { .. })
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return Error::UserAlreadyExists {
                        message: "User is already registered. Please login to the application."
                            .to_string(),
                    }
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return Error::ConstraintViolation {
                        message: "The referenced record does not exist or is still in use."
                            .to_string(),
                    }
                }
                _ => {}
            }
        }
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "HashError",
            message: err.to_string(),
        }
    }
}

impl From<lettre::error::Error> for Error {
    fn from(err: lettre::error::Error) -> Self {
        Self::InternalError {
            kind: "MailError",
            message: err.to_string(),
        }
    }
}

impl From<lettre::address::AddressError> for Error {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InternalError {
            kind: "MailAddressError",
            message: err.to_string(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for Error {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::InternalError {
            kind: "SmtpError",
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError {
            kind: "TaskError",
            message: err.to_string(),
        }
    }
}
