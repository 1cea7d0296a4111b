//! Multi-provider authentication layer.
//!
//! Providers are built from `[providers.*]` config entries and looked up by
//! name. The application registers one [`IdentityHandler`]; after any provider
//! authenticates a user, [`Multipass::login_succeeded`] hands the result to
//! that handler and picks the post-login redirect.
//!
//! HTTP concerns (cookies, templates, status codes) stay in `gateway`.

pub mod info;
pub mod oauth;
pub mod static_provider;
pub mod traits;

pub use info::{IdentityData, IdentityInfo};
pub use oauth::OAuthProvider;
pub use static_provider::StaticProvider;
pub use traits::{AuthError, AuthProvider, IdentityHandler, LoginKind};

use crate::config::{Config, ProviderConfig};
use crate::session::{FlashCategory, PendingLogin, SessionData};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fallback post-login target.
pub const DEFAULT_NEXT_URL: &str = "/";

/// State byte length before hex encoding.
const STATE_BYTES: usize = 24;

pub struct Multipass {
    providers: BTreeMap<String, Arc<dyn AuthProvider>>,
    handler: Arc<dyn IdentityHandler>,
}

impl Multipass {
    pub fn new(handler: Arc<dyn IdentityHandler>) -> Self {
        Self {
            providers: BTreeMap::new(),
            handler,
        }
    }

    /// Build every provider listed in the configuration.
    pub fn from_config(config: &Config, handler: Arc<dyn IdentityHandler>) -> anyhow::Result<Self> {
        let mut multipass = Self::new(handler);
        for (name, provider) in &config.providers {
            let built: Arc<dyn AuthProvider> = match provider {
                ProviderConfig::Static(c) => Arc::new(StaticProvider::new(name, c)),
                ProviderConfig::Oauth(c) => Arc::new(OAuthProvider::new(name, c)?),
            };
            tracing::info!(provider = %name, kind = provider.kind(), "Auth provider registered");
            multipass.register(built);
        }
        Ok(multipass)
    }

    pub fn register(&mut self, provider: Arc<dyn AuthProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn provider(&self, name: &str) -> Result<&Arc<dyn AuthProvider>, AuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| AuthError::UnknownProvider(name.to_string()))
    }

    /// Providers in name order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn AuthProvider>> {
        self.providers.values()
    }

    /// The provider to use when none was chosen: only when exactly one exists.
    pub fn sole_provider(&self) -> Option<&Arc<dyn AuthProvider>> {
        (self.providers.len() == 1)
            .then(|| self.providers.values().next())
            .flatten()
    }

    /// Start a redirect login: remember a fresh `state` in the session and
    /// return the identity server URL to send the browser to.
    pub fn begin_redirect_login(
        &self,
        provider: &str,
        redirect_uri: &str,
        session: &mut SessionData,
    ) -> Result<String, AuthError> {
        let provider = self.provider(provider)?;
        if provider.kind() != LoginKind::Redirect {
            return Err(AuthError::UnsupportedFlow(provider.name().to_string()));
        }
        let state = hex::encode(rand::random::<[u8; STATE_BYTES]>());
        let url = provider.authorize_url(&state, redirect_uri)?;
        session.pending_login = Some(PendingLogin {
            provider: provider.name().to_string(),
            state,
        });
        Ok(url)
    }

    /// Check the callback `state` against the pending login. The pending
    /// login is consumed either way.
    pub fn verify_callback_state(
        &self,
        provider: &str,
        state: Option<&str>,
        session: &mut SessionData,
    ) -> Result<(), AuthError> {
        let pending = session.pending_login.take();
        match (pending, state) {
            (Some(p), Some(s)) if p.provider == provider && p.state == s => Ok(()),
            _ => Err(AuthError::StateMismatch),
        }
    }

    /// Run the identity handler for a successful authentication and return
    /// the URL to redirect to.
    pub fn login_succeeded(
        &self,
        info: &IdentityInfo,
        session: &mut SessionData,
    ) -> Result<String, AuthError> {
        self.handler.handle(info, session)?;
        tracing::info!(
            provider = %info.provider,
            identifier = %info.identifier,
            user_id = ?session.user_id,
            "Login succeeded"
        );
        Ok(session
            .next_url
            .take()
            .unwrap_or_else(|| DEFAULT_NEXT_URL.to_string()))
    }

    /// Record a failed login as an error flash.
    pub fn login_failed(&self, provider: &str, error: &AuthError, session: &mut SessionData) {
        tracing::warn!(provider, error = %error, "Login failed");
        session.flash(FlashCategory::Error, format!("Login failed: {error}"));
    }

    /// Log the user out. With `clear_session` every session value goes,
    /// otherwise only the principal is dropped.
    pub fn logout(&self, session: &mut SessionData, clear_session: bool) {
        tracing::info!(user_id = ?session.user_id, "Logout");
        if clear_session {
            session.clear();
        } else {
            session.user_id = None;
        }
    }
}

/// Accept only local absolute paths as post-login targets.
pub fn sanitize_next_url(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    let local = next.starts_with('/')
        && !next.starts_with("//")
        && !next.starts_with("/\\")
        && !next.chars().any(|c| c.is_control());
    local.then(|| next.to_string())
}
