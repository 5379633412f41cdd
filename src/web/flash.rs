//! One-shot notices carried to the next rendered page in a signed cookie.
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, SignedCookieJar};

pub const FLASH_COOKIE: &str = "cmis_flash";

pub fn push<S: AsRef<str>>(jar: SignedCookieJar, message: S) -> SignedCookieJar {
    let value = urlencoding::encode(message.as_ref()).into_owned();
    jar.add(
        Cookie::build(FLASH_COOKIE, value)
            .path("/")
            .http_only(true)
            .finish(),
    )
}

/// Removes the pending notice, if any, and returns it.
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Option<String>) {
    let message = match jar.get(FLASH_COOKIE) {
        Some(cookie) => urlencoding::decode(cookie.value())
            .map(|message| message.into_owned())
            .ok(),
        None => return (jar, None),
    };
    let jar = jar.remove(Cookie::build(FLASH_COOKIE, "").path("/").finish());
    (jar, message)
}

pub fn redirect<S: AsRef<str>>(jar: SignedCookieJar, to: &str, message: S) -> Response {
    (push(jar, message), Redirect::to(to)).into_response()
}
