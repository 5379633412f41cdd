//! College management server: staff accounts, password resets by email and
//! record keeping for students, marks, courses and fees.
pub mod auth;
pub mod config;
pub mod err;
pub mod mail;
pub mod models;
pub mod password;
pub mod records;
pub mod reset;
pub mod store;
pub mod web;

use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use rand::RngCore;
use sha2::{Digest, Sha512};

use crate::config::Settings;
use crate::mail::Mailer;
use crate::store::{RecordStore, SessionStore, UserStore};

pub use crate::err::Error;
pub use crate::web::app;

/// Everything a request handler may touch, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub records: Arc<dyn RecordStore>,
    pub mailer: Arc<dyn Mailer>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, mailer: Arc<dyn Mailer>, settings: Settings) -> Self
    where
        S: UserStore + SessionStore + RecordStore + 'static,
    {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            records: store,
            mailer,
            settings: Arc::new(settings),
        }
    }
}

/// Cookie signing key derived from the configured secret.
pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

pub fn random_signing_key() -> Key {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    Key::from(&bytes[..])
}
