//! Signed session cookie carrying the opaque session id.

use super::store::SessionStore;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};

/// Derive the cookie signing key from the configured secret.
///
/// `Key::from` needs 64 bytes, which is exactly one SHA-512 digest.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Session id from a verified cookie, if the session is still live.
pub fn current_session_id(
    jar: &SignedCookieJar,
    cookie_name: &str,
    sessions: &SessionStore,
) -> Option<String> {
    let id = jar.get(cookie_name)?.value().to_owned();
    sessions.contains(&id).then_some(id)
}

/// Reuse the live session named by the cookie or start a new one.
///
/// Returns the (possibly updated) jar; it must be part of the response for a
/// new cookie to reach the browser.
pub fn ensure_session(
    jar: SignedCookieJar,
    cookie_name: &str,
    sessions: &SessionStore,
) -> (SignedCookieJar, String) {
    if let Some(id) = current_session_id(&jar, cookie_name, sessions) {
        return (jar, id);
    }
    let id = sessions.create();
    let jar = set_session_cookie(jar, cookie_name, id.clone());
    (jar, id)
}

/// Point the cookie at session `id` (new session or rotated id).
pub fn set_session_cookie(jar: SignedCookieJar, cookie_name: &str, id: String) -> SignedCookieJar {
    jar.add(session_cookie(cookie_name, id))
}

fn session_cookie(name: &str, id: String) -> Cookie<'static> {
    Cookie::build((name.to_owned(), id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
