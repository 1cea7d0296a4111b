use super::info::IdentityInfo;
use crate::session::SessionData;
use async_trait::async_trait;

/// Failures while authenticating against a provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("provider '{0}' does not accept this kind of login")]
    UnsupportedFlow(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("login state mismatch; please try again")]
    StateMismatch,
    #[error("identity server denied the login: {0}")]
    Denied(String),
    #[error("identity server error: {0}")]
    Upstream(String),
    #[error("identity handling failed: {0}")]
    Identity(String),
    /// Storage or other server-side failure; never shown to the user.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}

/// How a provider collects credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    /// Username/password form rendered by this application.
    Form,
    /// Browser redirect to an external identity server and back.
    Redirect,
}

/// A configured authentication source.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Name used in routes and stored on identities.
    fn name(&self) -> &str;

    /// Human-readable label for the login selector.
    fn title(&self) -> &str;

    fn kind(&self) -> LoginKind;

    /// Check submitted form credentials.
    async fn authenticate_form(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<IdentityInfo, AuthError> {
        Err(AuthError::UnsupportedFlow(self.name().to_string()))
    }

    /// Identity server URL that starts a redirect login.
    fn authorize_url(&self, _state: &str, _redirect_uri: &str) -> Result<String, AuthError> {
        Err(AuthError::UnsupportedFlow(self.name().to_string()))
    }

    /// Finish a redirect login from the callback's authorization code.
    async fn authenticate_callback(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<IdentityInfo, AuthError> {
        Err(AuthError::UnsupportedFlow(self.name().to_string()))
    }
}

/// Application hook invoked after every successful authentication.
///
/// Implementations persist the identity and set the session principal.
pub trait IdentityHandler: Send + Sync {
    fn handle(&self, info: &IdentityInfo, session: &mut SessionData) -> Result<(), AuthError>;
}
