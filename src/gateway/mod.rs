//! Axum-based HTTP gateway: dashboard, login/logout routes and the
//! redirect-login callback.
//!
//! - Request body size limits (64KB max)
//! - Request timeouts (30s)
//! - Signed session cookie, server-side session state

pub mod dashboard;
pub mod pages;

use crate::auth::IdentityStore;
use crate::config::Config;
use crate::identity::StoreIdentityHandler;
use crate::multipass::{
    sanitize_next_url, AuthError, AuthProvider, IdentityInfo, LoginKind, Multipass,
};
use crate::session::{
    cookie_key, current_session_id, ensure_session, set_session_cookie, SessionData, SessionStore,
};
use anyhow::Result;
use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Form, Router,
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s); covers the identity server round trips of a callback
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// How often expired sessions are swept.
const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<IdentityStore>,
    pub sessions: Arc<SessionStore>,
    pub multipass: Arc<Multipass>,
    /// Signs the session cookie.
    pub cookie_key: Key,
    pub cookie_name: Arc<str>,
    /// Base URL for this gateway (e.g. "http://127.0.0.1:8050").
    pub base_url: Arc<str>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    /// Wire store, sessions and providers from the configuration.
    pub fn from_config(config: &Config, store: Arc<IdentityStore>) -> Result<Self> {
        let handler = Arc::new(StoreIdentityHandler::new(Arc::clone(&store)));
        let multipass = Multipass::from_config(config, handler)?;
        Ok(Self {
            store,
            sessions: Arc::new(
                SessionStore::new(config.session.ttl_secs)
                    .with_max_sessions(config.session.max_sessions),
            ),
            multipass: Arc::new(multipass),
            cookie_key: cookie_key(&config.secret_key),
            cookie_name: Arc::from(config.session.cookie_name.as_str()),
            base_url: Arc::from(config.server.base_url()),
        })
    }

    /// Callback URL registered with redirect providers.
    fn redirect_uri(&self, provider: &str) -> String {
        format!("{}/login/{provider}/authorized", self.base_url)
    }

    /// Run `f` on the session `sid`; a session that expired meanwhile is
    /// recreated so the outcome is not lost.
    fn with_session<R>(&self, sid: &str, f: impl FnOnce(&mut SessionData) -> R) -> R {
        self.sessions.update_or_revive(sid, f)
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard::handle_index))
        .route("/health", get(handle_health))
        .route("/api/button", get(dashboard::handle_button))
        .route("/api/status", get(dashboard::handle_status))
        .route("/api/flashes", get(dashboard::handle_flashes))
        .route("/login", get(handle_login_select).post(handle_login_select))
        .route("/login/", get(handle_login_select).post(handle_login_select))
        .route(
            "/login/{provider}",
            get(handle_login_page).post(handle_login_submit),
        )
        .route("/login/{provider}/authorized", get(handle_login_callback))
        .route("/logout", get(handle_logout))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until Ctrl+C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let db_path = config.database.resolved_path();
    let store = Arc::new(IdentityStore::new(&db_path)?);
    tracing::info!("Identity store initialized at {}", db_path.display());

    let state = AppState::from_config(&config, store)?;

    // Periodic session sweep
    let sessions_for_sweep = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = sessions_for_sweep.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "Swept expired sessions");
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    println!("Dashboard listening on http://{display_addr}");
    println!("  GET  /                    — dashboard");
    println!("  GET  /login/              — choose a provider");
    for provider in state.multipass.providers() {
        println!(
            "  GET  /login/{:<14}— {} ({})",
            provider.name(),
            provider.title(),
            match provider.kind() {
                LoginKind::Form => "form",
                LoginKind::Redirect => "redirect",
            }
        );
    }
    println!("  GET  /logout              — log out and clear session");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

/// Form data for form-based providers.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn unknown_provider(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(pages::render_message(
            "Unknown provider",
            &format!("No login provider named '{name}' is configured."),
        )),
    )
        .into_response()
}

fn remember_next(state: &AppState, sid: &str, next: Option<&str>) {
    if let Some(next) = sanitize_next_url(next) {
        state.sessions.update(sid, |s| s.next_url = Some(next));
    }
}

/// GET /health: always public
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len(),
    }))
}

/// GET|POST /login/: go to the only provider, or let the user choose.
async fn handle_login_select(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    let (jar, sid) = ensure_session(jar, &state.cookie_name, &state.sessions);
    remember_next(&state, &sid, query.next.as_deref());

    if let Some(provider) = state.multipass.sole_provider() {
        return (jar, Redirect::to(&format!("/login/{}", provider.name()))).into_response();
    }

    let flashes = state
        .sessions
        .update(&sid, |s| s.take_flashes())
        .unwrap_or_default();
    let providers: Vec<Arc<dyn AuthProvider>> = state.multipass.providers().cloned().collect();
    (jar, Html(pages::render_login_selector(&providers, &flashes))).into_response()
}

/// GET /login/{provider}: render the form or redirect to the identity server.
async fn handle_login_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(provider_name): Path<String>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let provider = match state.multipass.provider(&provider_name) {
        Ok(p) => Arc::clone(p),
        Err(_) => return unknown_provider(&provider_name),
    };
    let (jar, sid) = ensure_session(jar, &state.cookie_name, &state.sessions);
    remember_next(&state, &sid, query.next.as_deref());

    match provider.kind() {
        LoginKind::Form => {
            let flashes = state
                .sessions
                .update(&sid, |s| s.take_flashes())
                .unwrap_or_default();
            (jar, Html(pages::render_login_form(provider.as_ref(), &flashes))).into_response()
        }
        LoginKind::Redirect => {
            let redirect_uri = state.redirect_uri(provider.name());
            let started = state.with_session(&sid, |s| {
                state
                    .multipass
                    .begin_redirect_login(provider.name(), &redirect_uri, s)
                    .inspect_err(|e| state.multipass.login_failed(provider.name(), e, s))
            });
            match started {
                Ok(url) => (jar, Redirect::to(&url)).into_response(),
                Err(_) => (jar, Redirect::to("/")).into_response(),
            }
        }
    }
}

/// POST /login/{provider}: check submitted credentials.
async fn handle_login_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(provider_name): Path<String>,
    Form(form): Form<LoginForm>,
) -> Response {
    let provider = match state.multipass.provider(&provider_name) {
        Ok(p) => Arc::clone(p),
        Err(_) => return unknown_provider(&provider_name),
    };
    if provider.kind() == LoginKind::Redirect {
        return handle_login_page(
            State(state),
            jar,
            Path(provider_name),
            Query(LoginQuery::default()),
        )
        .await;
    }

    let (jar, sid) = ensure_session(jar, &state.cookie_name, &state.sessions);
    let result = provider
        .authenticate_form(&form.username, &form.password)
        .await;
    let failure_target = format!("/login/{}", provider.name());
    finish_login(&state, jar, &sid, provider.name(), result, &failure_target)
}

/// GET /login/{provider}/authorized: redirect-login callback.
async fn handle_login_callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let provider = match state.multipass.provider(&provider_name) {
        Ok(p) => Arc::clone(p),
        Err(_) => return unknown_provider(&provider_name),
    };
    let (jar, sid) = ensure_session(jar, &state.cookie_name, &state.sessions);

    let checked = state.with_session(&sid, |s| {
        state
            .multipass
            .verify_callback_state(provider.name(), query.state.as_deref(), s)
    });

    let result = match (checked, query.error, query.code) {
        (Err(e), _, _) => Err(e),
        (Ok(()), Some(error), _) => Err(AuthError::Denied(
            query.error_description.unwrap_or(error),
        )),
        (Ok(()), None, None) => Err(AuthError::Denied("no authorization code received".into())),
        (Ok(()), None, Some(code)) => {
            provider
                .authenticate_callback(&code, &state.redirect_uri(provider.name()))
                .await
        }
    };

    finish_login(&state, jar, &sid, provider.name(), result, "/")
}

/// Hand a provider result to the identity handler.
///
/// The handler runs on a copy of the session, outside the session map lock.
/// On success the session moves to a fresh id and the browser is sent to the
/// post-login target. Login failures are flashed and redirect to
/// `failure_target`; internal failures answer 500.
fn finish_login(
    state: &AppState,
    jar: SignedCookieJar,
    sid: &str,
    provider: &str,
    result: Result<IdentityInfo, AuthError>,
    failure_target: &str,
) -> Response {
    let mut session = state.sessions.load(sid).unwrap_or_default();
    let outcome = result.and_then(|info| state.multipass.login_succeeded(&info, &mut session));
    match outcome {
        Ok(next) => {
            let new_sid = state.sessions.rotate(sid, session);
            let jar = set_session_cookie(jar, &state.cookie_name, new_sid);
            (jar, Redirect::to(&next)).into_response()
        }
        Err(AuthError::Internal(detail)) => {
            state.with_session(sid, |s| *s = session);
            dashboard::internal_error(&format!("login via '{provider}' failed: {detail}"))
        }
        Err(e) => {
            state.multipass.login_failed(provider, &e, &mut session);
            state.with_session(sid, |s| *s = session);
            (jar, Redirect::to(failure_target)).into_response()
        }
    }
}

/// GET /logout: drop the principal and clear the session.
async fn handle_logout(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    if let Some(sid) = current_session_id(&jar, &state.cookie_name, &state.sessions) {
        state
            .sessions
            .update(&sid, |s| state.multipass.logout(s, true));
    }
    (jar, Redirect::to("/")).into_response()
}
