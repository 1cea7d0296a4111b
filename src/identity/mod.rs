//! Identity resolution: turn a successful authentication into a persisted
//! user and make that user the session principal.

use crate::auth::{IdentityStore, NewUser, Resolution};
use crate::multipass::{AuthError, IdentityHandler, IdentityInfo};
use crate::session::{FlashCategory, SessionData};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identity payload: {0}")]
    InvalidPayload(String),
    #[error("identity store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<IdentityError> for AuthError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidPayload(_) => Self::Identity(e.to_string()),
            IdentityError::Store(source) => Self::Internal(format!("{source:#}")),
        }
    }
}

/// Check the payload before anything is written and extract the profile
/// used if a user has to be created.
pub fn validate(info: &IdentityInfo) -> Result<NewUser, IdentityError> {
    if info.provider.trim().is_empty() {
        return Err(IdentityError::InvalidPayload("provider name is empty".into()));
    }
    if info.identifier.trim().is_empty() {
        return Err(IdentityError::InvalidPayload("identifier is empty".into()));
    }
    let email = info
        .data
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| IdentityError::InvalidPayload("email is missing".into()))?;
    if !email.contains('@') {
        return Err(IdentityError::InvalidPayload(format!(
            "'{email}' is not an email address"
        )));
    }

    Ok(NewUser {
        name: info.data.name.clone(),
        email: Some(email.to_string()),
        affiliation: info.data.affiliation.clone(),
        node_id: info.data.node_id,
    })
}

/// Identity handler backed by the SQLite store.
pub struct StoreIdentityHandler {
    store: Arc<IdentityStore>,
}

impl StoreIdentityHandler {
    pub fn new(store: Arc<IdentityStore>) -> Self {
        Self { store }
    }

    /// Resolve `info` to a user, store the provider metadata, set the
    /// principal and flash a success message.
    pub fn resolve(
        &self,
        info: &IdentityInfo,
        session: &mut SessionData,
    ) -> Result<Resolution, IdentityError> {
        let profile = validate(info)?;
        let multipass_data = serde_json::to_string(&info.multipass_data)
            .map_err(|e| IdentityError::Store(e.into()))?;

        let resolution =
            self.store
                .resolve_identity(&info.provider, &info.identifier, &profile, &multipass_data)?;

        if resolution.created_user {
            tracing::info!(user_id = resolution.user.id, "Created user");
        }
        if resolution.created_identity {
            tracing::info!(
                user_id = resolution.user.id,
                provider = %info.provider,
                "Bound new identity"
            );
        }

        session.user_id = Some(resolution.user.id);
        session.flash(FlashCategory::Success, format!("Received IdentityInfo: {info}"));
        Ok(resolution)
    }
}

impl IdentityHandler for StoreIdentityHandler {
    fn handle(&self, info: &IdentityInfo, session: &mut SessionData) -> Result<(), AuthError> {
        self.resolve(info, session)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipass::IdentityData;

    fn handler() -> (Arc<IdentityStore>, StoreIdentityHandler) {
        let store = Arc::new(IdentityStore::open_in_memory().unwrap());
        (store.clone(), StoreIdentityHandler::new(store))
    }

    fn info(provider: &str, identifier: &str, email: Option<&str>, meta: serde_json::Value) -> IdentityInfo {
        IdentityInfo {
            provider: provider.into(),
            identifier: identifier.into(),
            data: IdentityData {
                email: email.map(Into::into),
                name: Some("Ada Lovelace".into()),
                affiliation: Some("Analytical Engines".into()),
                node_id: Some(3),
            },
            multipass_data: meta,
        }
    }

    #[test]
    fn new_identity_with_unseen_email_creates_user_and_sets_principal() {
        let (store, handler) = handler();
        let mut session = SessionData::default();

        let res = handler
            .resolve(
                &info("sso", "ada-123", Some("ada@example.org"), serde_json::json!({"v": 1})),
                &mut session,
            )
            .unwrap();

        assert_eq!(store.user_count().unwrap(), 1);
        assert_eq!(store.identity_count().unwrap(), 1);
        assert_eq!(session.user_id, Some(res.user.id));
        assert_eq!(res.user.node_id, Some(3));
        assert_eq!(res.user.affiliation.as_deref(), Some("Analytical Engines"));
        assert_eq!(session.flashes.len(), 1);
        assert_eq!(session.flashes[0].category, FlashCategory::Success);
        assert_eq!(
            session.flashes[0].message,
            "Received IdentityInfo: <IdentityInfo(sso, ada-123)>"
        );
    }

    #[test]
    fn known_email_under_new_provider_attaches_identity() {
        let (store, handler) = handler();
        let mut session = SessionData::default();

        let first = handler
            .resolve(&info("sso", "ada-123", Some("ada@example.org"), serde_json::json!({})), &mut session)
            .unwrap();
        let mut other_session = SessionData::default();
        let second = handler
            .resolve(&info("local", "ada", Some("ada@example.org"), serde_json::json!({})), &mut other_session)
            .unwrap();

        assert_eq!(second.user.id, first.user.id);
        assert!(second.created_identity);
        assert_eq!(store.user_count().unwrap(), 1);
        assert_eq!(store.identity_count().unwrap(), 2);
        assert_eq!(other_session.user_id, Some(first.user.id));
    }

    #[test]
    fn repeat_login_overwrites_metadata_blob() {
        let (store, handler) = handler();
        let mut session = SessionData::default();

        handler
            .resolve(&info("sso", "ada-123", Some("ada@example.org"), serde_json::json!({"v": 1})), &mut session)
            .unwrap();
        handler
            .resolve(&info("sso", "ada-123", Some("ada@example.org"), serde_json::json!({"v": 2})), &mut session)
            .unwrap();

        assert_eq!(store.user_count().unwrap(), 1);
        assert_eq!(store.identity_count().unwrap(), 1);
        let identity = store.find_identity("sso", "ada-123").unwrap().unwrap();
        assert_eq!(identity.multipass_data.as_deref(), Some(r#"{"v":2}"#));
    }

    #[test]
    fn missing_email_is_rejected_without_writes() {
        let (store, handler) = handler();
        let mut session = SessionData::default();

        let err = handler
            .resolve(&info("sso", "ada-123", None, serde_json::json!({})), &mut session)
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidPayload(_)));
        assert_eq!(store.user_count().unwrap(), 0);
        assert!(session.user_id.is_none());
        assert!(session.flashes.is_empty());
    }

    #[test]
    fn validation_rules() {
        assert!(validate(&info("sso", "x", Some("  "), serde_json::Value::Null)).is_err());
        assert!(validate(&info("sso", "x", Some("not-an-email"), serde_json::Value::Null)).is_err());
        assert!(validate(&info(" ", "x", Some("a@b.c"), serde_json::Value::Null)).is_err());
        assert!(validate(&info("sso", "", Some("a@b.c"), serde_json::Value::Null)).is_err());

        let profile = validate(&info("sso", "x", Some(" a@b.c "), serde_json::Value::Null)).unwrap();
        assert_eq!(profile.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn store_failure_is_internal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dashpass.db");
        let store = Arc::new(IdentityStore::new(&path).unwrap());
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE identities;")
            .unwrap();
        let handler = StoreIdentityHandler::new(store);
        let mut session = SessionData::default();

        let info = info("sso", "ada-123", Some("ada@example.org"), serde_json::json!({}));
        let err = handler.resolve(&info, &mut session).unwrap_err();
        assert!(matches!(err, IdentityError::Store(_)));
        assert!(session.user_id.is_none());

        let err = IdentityHandler::handle(&handler, &info, &mut session).unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(session.flashes.is_empty());
    }

    #[test]
    fn handler_trait_maps_errors() {
        let (_store, handler) = handler();
        let mut session = SessionData::default();
        let err = IdentityHandler::handle(
            &handler,
            &info("sso", "x", None, serde_json::Value::Null),
            &mut session,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Identity(ref m) if m.contains("email is missing")));
    }
}
