//! OAuth2 authorization-code provider.
//!
//! ## Flow
//!
//! 1. `GET /login/{provider}` → redirect to `authorize_url` with a random `state`
//! 2. Identity server redirects back to `/login/{provider}/authorized?code=…&state=…`
//! 3. `code` is exchanged at `token_url`, then `userinfo_url` is read with the
//!    access token
//! 4. Userinfo fields are mapped onto [`IdentityData`]
//!
//! Token validation is the identity server's job; this provider only talks
//! HTTP to it.

use super::info::{IdentityData, IdentityInfo};
use super::traits::{AuthError, AuthProvider, LoginKind};
use crate::config::OAuthProviderConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Timeout for token and userinfo calls.
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Token response fields never written to the identity metadata blob.
const SECRET_TOKEN_FIELDS: [&str; 3] = ["access_token", "refresh_token", "id_token"];

pub struct OAuthProvider {
    name: String,
    title: String,
    config: OAuthProviderConfig,
    http: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(name: &str, config: &OAuthProviderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            name: name.to_string(),
            title: config.title.clone().unwrap_or_else(|| name.to_string()),
            config: config.clone(),
            http,
        })
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Value, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let resp = self
            .http
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            let detail = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or(error);
            return Err(AuthError::Denied(detail.to_string()));
        }
        if !status.is_success() {
            return Err(AuthError::Upstream(format!("token endpoint returned {status}")));
        }
        Ok(body)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, AuthError> {
        let resp = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Upstream(format!(
                "userinfo endpoint returned {status}"
            )));
        }
        let userinfo: Value = resp.json().await?;
        if !userinfo.is_object() {
            return Err(AuthError::Upstream("userinfo is not a JSON object".into()));
        }
        Ok(userinfo)
    }

    fn identity_from_userinfo(&self, token: &Value, userinfo: Value) -> Result<IdentityInfo, AuthError> {
        let identifier = string_field(&userinfo, &self.config.identifier_field).ok_or_else(|| {
            AuthError::Upstream(format!(
                "userinfo has no '{}' field",
                self.config.identifier_field
            ))
        })?;

        let mapping = &self.config.mapping;
        let data = IdentityData {
            email: string_field(&userinfo, &mapping.email),
            name: string_field(&userinfo, &mapping.name),
            affiliation: mapping
                .affiliation
                .as_deref()
                .and_then(|field| string_field(&userinfo, field)),
            node_id: None,
        };

        Ok(IdentityInfo {
            provider: self.name.clone(),
            identifier,
            data,
            multipass_data: serde_json::json!({
                "oauth_token": redact_token(token),
                "userinfo": userinfo,
            }),
        })
    }
}

#[async_trait]
impl AuthProvider for OAuthProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn kind(&self) -> LoginKind {
        LoginKind::Redirect
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let base = &self.config.authorize_url;
        let sep = if base.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{base}{sep}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(state),
        ))
    }

    async fn authenticate_callback(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<IdentityInfo, AuthError> {
        let token = self.exchange_code(code, redirect_uri).await?;
        let access_token = token
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Upstream("token response has no access_token".into()))?;
        let userinfo = self.fetch_userinfo(access_token).await?;
        let info = self.identity_from_userinfo(&token, userinfo)?;
        tracing::debug!(provider = %self.name, identifier = %info.identifier, "OAuth login completed");
        Ok(info)
    }
}

/// Read a string (or number) field as a trimmed, non-empty string.
fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn redact_token(token: &Value) -> Value {
    let mut token = token.clone();
    if let Some(obj) = token.as_object_mut() {
        for field in SECRET_TOKEN_FIELDS {
            obj.remove(field);
        }
    }
    token
}
