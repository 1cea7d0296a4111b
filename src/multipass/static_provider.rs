//! Provider backed by username/password pairs from the configuration file.
//!
//! Meant for development setups and small deployments; passwords are kept in
//! plain text in the config, so treat that file as a secret.

use super::info::{IdentityData, IdentityInfo};
use super::traits::{AuthError, AuthProvider, LoginKind};
use crate::config::StaticProviderConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct StaticProvider {
    name: String,
    title: String,
    identities: BTreeMap<String, String>,
    identity_data: BTreeMap<String, IdentityData>,
}

impl StaticProvider {
    pub fn new(name: &str, config: &StaticProviderConfig) -> Self {
        let identity_data = config
            .identity_data
            .iter()
            .map(|(user, data)| {
                (
                    user.clone(),
                    IdentityData {
                        email: data.email.clone(),
                        name: data.name.clone(),
                        affiliation: data.affiliation.clone(),
                        node_id: data.node_id,
                    },
                )
            })
            .collect();
        Self {
            name: name.to_string(),
            title: config.title.clone().unwrap_or_else(|| name.to_string()),
            identities: config.identities.clone(),
            identity_data,
        }
    }
}

#[async_trait]
impl AuthProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn kind(&self) -> LoginKind {
        LoginKind::Form
    }

    async fn authenticate_form(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IdentityInfo, AuthError> {
        let username = username.trim();
        let Some(expected) = self.identities.get(username) else {
            return Err(AuthError::InvalidCredentials);
        };
        if !constant_time_eq(expected.as_bytes(), password.as_bytes()) {
            return Err(AuthError::InvalidCredentials);
        }

        tracing::debug!(provider = %self.name, user = username, "Static credentials accepted");
        Ok(IdentityInfo {
            provider: self.name.clone(),
            identifier: username.to_string(),
            data: self.identity_data.get(username).cloned().unwrap_or_default(),
            multipass_data: serde_json::json!({ "login": username }),
        })
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityDataConfig;

    fn provider() -> StaticProvider {
        let mut config = StaticProviderConfig {
            title: Some("Local accounts".into()),
            ..StaticProviderConfig::default()
        };
        config.identities.insert("ada".into(), "secret".into());
        config.identities.insert("grace".into(), "hopper".into());
        config.identity_data.insert(
            "ada".into(),
            IdentityDataConfig {
                email: Some("ada@example.org".into()),
                name: Some("Ada Lovelace".into()),
                ..IdentityDataConfig::default()
            },
        );
        StaticProvider::new("local", &config)
    }

    #[tokio::test]
    async fn valid_credentials_yield_identity() {
        let info = provider().authenticate_form("ada", "secret").await.unwrap();
        assert_eq!(info.provider, "local");
        assert_eq!(info.identifier, "ada");
        assert_eq!(info.data.email.as_deref(), Some("ada@example.org"));
        assert_eq!(info.multipass_data["login"], "ada");
    }

    #[tokio::test]
    async fn user_without_profile_gets_empty_data() {
        let info = provider().authenticate_form("grace", "hopper").await.unwrap();
        assert_eq!(info.data, IdentityData::default());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let err = provider().authenticate_form("ada", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let err = provider().authenticate_form("ghost", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        // another user's password does not help
        let err = provider().authenticate_form("ghost", "hopper").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = provider().authenticate_form("", "").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn redirect_flow_is_unsupported() {
        let err = provider().authorize_url("state", "http://x/cb").unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedFlow(_)));
    }

    #[test]
    fn title_defaults_to_name() {
        let p = StaticProvider::new("dev", &StaticProviderConfig::default());
        assert_eq!(p.title(), "dev");
        assert_eq!(p.kind(), LoginKind::Form);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
