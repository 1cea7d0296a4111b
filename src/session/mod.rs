//! Web sessions: an in-memory store plus the signed cookie that points at it.

pub mod cookie;
pub mod store;

pub use cookie::{cookie_key, current_session_id, ensure_session, set_session_cookie};
pub use store::{
    Flash, FlashCategory, PendingLogin, SessionData, SessionStore, DEFAULT_MAX_SESSIONS,
};
