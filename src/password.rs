//! Salted one-way password hashing.
use lazy_static::lazy_static;
use pbkdf2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;

use crate::err::{Error, Result};

lazy_static! {
    static ref DECOY_HASH: String = hash_password("decoy password").unwrap_or_default();
}

pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Pbkdf2.hash_password(plain.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Returns `Ok(false)` on a wrong password and [`Error::MalformedHash`] when
/// `stored` is not a complete PBKDF2 PHC string.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool> {
    let hash = PasswordHash::new(stored).map_err(|_| Error::MalformedHash)?;
    if !hash.algorithm.as_str().starts_with("pbkdf2") {
        return Err(Error::MalformedHash);
    }
    check_shape(&hash)?;
    match Pbkdf2.verify_password(plain.as_bytes(), &hash) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => {
            log::warn!("Stored password hash is unusable: {}", err);
            Err(Error::MalformedHash)
        }
    }
}

/// The verifier reports a missing salt or output as a plain mismatch, so
/// those are caught here along with non-numeric params and an output whose
/// length disagrees with `l`.
fn check_shape(hash: &PasswordHash<'_>) -> Result<()> {
    let output = match (&hash.salt, &hash.hash) {
        (Some(_), Some(output)) => output,
        _ => return Err(Error::MalformedHash),
    };
    for (name, value) in hash.params.iter() {
        let number = value.decimal().map_err(|_| Error::MalformedHash)?;
        if name.as_str() == "l" && number as usize != output.len() {
            return Err(Error::MalformedHash);
        }
    }
    Ok(())
}

/// Spends the cost of one verification so that unknown accounts take as long
/// to reject as wrong passwords.
pub fn burn_verification(plain: &str) {
    let _ = verify_password(plain, &DECOY_HASH);
}
