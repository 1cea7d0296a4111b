//! Dashboard page and the two UI callbacks behind it.
//!
//! - `GET /api/button`: login/logout button for the current session
//! - `GET /api/status`: notification for the "Test connection status" button

use super::{pages, AppState};
use crate::auth::User;
use crate::session::{current_session_id, Flash};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::{Deserialize, Serialize};

/// Login/logout button descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogButton {
    pub title: String,
    pub icon: String,
    pub color: String,
    pub href: String,
}

/// Toast shown after clicking "Test connection status".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub color: String,
    pub icon: String,
}

/// Button for the current login state.
pub fn log_button(logged_in: bool, base_url: &str) -> LogButton {
    if logged_in {
        // user is logged in, and can log out
        LogButton {
            title: "Log out".into(),
            icon: "ion:log-out-outline".into(),
            color: "red".into(),
            href: format!("{base_url}/logout"),
        }
    } else {
        LogButton {
            title: "Log in".into(),
            icon: "ion:log-in-outline".into(),
            color: "green".into(),
            href: format!("{base_url}/login"),
        }
    }
}

/// Login prompt without a user, welcome message with one.
pub fn connection_status(user: Option<&User>) -> Notification {
    match user {
        None => Notification {
            id: "simple-notify-login".into(),
            title: "You need to log in".into(),
            message: "Click on the button login to log in.".into(),
            color: "red".into(),
            icon: "lucid:x".into(),
        },
        Some(user) => Notification {
            id: "simple-notify-logout".into(),
            title: format!("Welcome {}", user.display_name()),
            message: "You are logged in. Click on logout to log out.".into(),
            color: "green".into(),
            icon: "lucid:check".into(),
        },
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub clicks: u32,
}

/// Principal of the session named by the cookie, if its user still exists.
pub(super) fn current_user(state: &AppState, jar: &SignedCookieJar) -> anyhow::Result<Option<User>> {
    let Some(sid) = current_session_id(jar, &state.cookie_name, &state.sessions) else {
        return Ok(None);
    };
    let Some(user_id) = state.sessions.load(&sid).and_then(|s| s.user_id) else {
        return Ok(None);
    };
    let user = state.store.get_user(user_id)?;
    if user.is_none() {
        tracing::warn!(user_id, "Session principal has no user row; treating as logged out");
    }
    Ok(user)
}

pub(super) fn internal_error(e: &dyn std::fmt::Display) -> Response {
    tracing::error!("Request failed: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(pages::render_message("Error", "Something went wrong. Please try again.")),
    )
        .into_response()
}

/// GET /: dashboard page.
///
/// Read-only: no session is started for visitors without one.
pub async fn handle_index(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let flashes = current_session_id(&jar, &state.cookie_name, &state.sessions)
        .and_then(|sid| state.sessions.update(&sid, |s| s.take_flashes()))
        .unwrap_or_default();
    let user = match current_user(&state, &jar) {
        Ok(user) => user,
        Err(e) => return internal_error(&e),
    };
    let button = log_button(user.is_some(), &state.base_url);
    Html(pages::render_dashboard(&button, &flashes)).into_response()
}

/// GET /api/button: button swap callback.
pub async fn handle_button(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    match current_user(&state, &jar) {
        Ok(user) => Json(log_button(user.is_some(), &state.base_url)).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/status?clicks=N: connection status callback. No update on 0 clicks.
pub async fn handle_status(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<StatusQuery>,
) -> Response {
    if query.clicks == 0 {
        return StatusCode::NO_CONTENT.into_response();
    }
    match current_user(&state, &jar) {
        Ok(user) => Json(connection_status(user.as_ref())).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/flashes: pop pending flash messages.
pub async fn handle_flashes(State(state): State<AppState>, jar: SignedCookieJar) -> Json<Vec<Flash>> {
    let flashes = current_session_id(&jar, &state.cookie_name, &state.sessions)
        .and_then(|sid| state.sessions.update(&sid, |s| s.take_flashes()))
        .unwrap_or_default();
    Json(flashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> User {
        User {
            id: 1,
            name: Some("Ada Lovelace".into()),
            email: Some("ada@example.org".into()),
            affiliation: None,
            node_id: None,
        }
    }

    #[test]
    fn logged_out_button_points_to_login() {
        let b = log_button(false, "http://127.0.0.1:8050");
        assert_eq!(b.title, "Log in");
        assert_eq!(b.color, "green");
        assert_eq!(b.icon, "ion:log-in-outline");
        assert_eq!(b.href, "http://127.0.0.1:8050/login");
    }

    #[test]
    fn logged_in_button_points_to_logout() {
        let b = log_button(true, "https://dash.example.org");
        assert_eq!(b.title, "Log out");
        assert_eq!(b.color, "red");
        assert_eq!(b.href, "https://dash.example.org/logout");
    }

    #[test]
    fn status_without_user_prompts_login() {
        let n = connection_status(None);
        assert_eq!(n.title, "You need to log in");
        assert_eq!(n.color, "red");
        assert_eq!(n.id, "simple-notify-login");
    }

    #[test]
    fn status_with_user_welcomes_by_name() {
        let n = connection_status(Some(&ada()));
        assert_eq!(n.title, "Welcome Ada Lovelace");
        assert_eq!(n.color, "green");
        assert_eq!(n.icon, "lucid:check");
    }

    #[test]
    fn status_query_defaults_to_zero_clicks() {
        let q: StatusQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.clicks, 0);
    }
}
