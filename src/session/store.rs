//! In-memory web sessions with sliding TTL expiry.
//!
//! Sessions are transient: they hold the principal (`user_id`), pending
//! flash messages, and the in-flight state of a redirect login. Nothing
//! here is written to disk.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Session id byte length before hex encoding (32 bytes = 64 hex chars).
const SESSION_ID_BYTES: usize = 32;

/// Flash messages kept per session before the oldest is dropped.
const MAX_FLASHES: usize = 16;

/// Default cap on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Success,
    Error,
    Info,
}

/// One-shot user-visible message, shown on the next page render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

/// A redirect login waiting for the identity server callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub provider: String,
    pub state: String,
}

/// Per-session values.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Principal: id of the logged-in user.
    pub user_id: Option<i64>,
    pub flashes: Vec<Flash>,
    pub pending_login: Option<PendingLogin>,
    /// Where to go after a successful login.
    pub next_url: Option<String>,
}

impl SessionData {
    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn flash(&mut self, category: FlashCategory, message: impl Into<String>) {
        if self.flashes.len() >= MAX_FLASHES {
            self.flashes.remove(0);
        }
        self.flashes.push(Flash {
            category,
            message: message.into(),
        });
    }

    /// Remove and return all pending flashes.
    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }

    /// Reset everything (logout with session clearing).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

struct SessionSlot {
    data: SessionData,
    expires_at: Instant,
}

/// Thread-safe session map keyed by opaque random ids.
pub struct SessionStore {
    slots: Mutex<HashMap<String, SessionSlot>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs.max(1)),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Cap the number of live sessions (at least 1).
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Start an empty session and return its id.
    ///
    /// At capacity, expired sessions are dropped first, then the least
    /// recently used one.
    pub fn create(&self) -> String {
        let id = generate_session_id();
        let now = Instant::now();
        let mut slots = self.slots.lock();
        self.make_room(&mut slots, now);
        slots.insert(
            id.clone(),
            SessionSlot {
                data: SessionData::default(),
                expires_at: now + self.ttl,
            },
        );
        id
    }

    /// Move `data` to a fresh id and drop `old_id`. Returns the new id.
    ///
    /// Called on login so an id handed out before authentication never
    /// carries a principal.
    pub fn rotate(&self, old_id: &str, data: SessionData) -> String {
        let id = generate_session_id();
        let now = Instant::now();
        let mut slots = self.slots.lock();
        slots.remove(old_id);
        self.make_room(&mut slots, now);
        slots.insert(
            id.clone(),
            SessionSlot {
                data,
                expires_at: now + self.ttl,
            },
        );
        id
    }

    fn make_room(&self, slots: &mut HashMap<String, SessionSlot>, now: Instant) {
        if slots.len() < self.max_sessions {
            return;
        }
        slots.retain(|_, slot| slot.expires_at > now);
        while slots.len() >= self.max_sessions {
            let Some(oldest) = slots
                .iter()
                .min_by_key(|(_, slot)| slot.expires_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            slots.remove(&oldest);
            tracing::debug!("Session cap reached; evicted least recently used session");
        }
    }

    /// Whether `id` names a live session.
    pub fn contains(&self, id: &str) -> bool {
        let now = Instant::now();
        self.slots
            .lock()
            .get(id)
            .is_some_and(|slot| slot.expires_at > now)
    }

    /// Snapshot of a live session. Touching a session extends its expiry.
    pub fn load(&self, id: &str) -> Option<SessionData> {
        self.update(id, |data| data.clone())
    }

    /// Mutate a live session in place. Returns `None` if it does not exist
    /// or has expired.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut SessionData) -> R) -> Option<R> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(id)?;
        if slot.expires_at <= now {
            slots.remove(id);
            return None;
        }
        slot.expires_at = now + self.ttl;
        Some(f(&mut slot.data))
    }

    /// Like [`update`](Self::update), but a missing or expired session is
    /// recreated empty under the same id first.
    pub fn update_or_revive<R>(&self, id: &str, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if !slots.contains_key(id) {
            self.make_room(&mut slots, now);
        }
        let slot = slots.entry(id.to_string()).or_insert_with(|| SessionSlot {
            data: SessionData::default(),
            expires_at: now,
        });
        if slot.expires_at <= now {
            slot.data = SessionData::default();
        }
        slot.expires_at = now + self.ttl;
        f(&mut slot.data)
    }

    /// Drop a session entirely.
    pub fn destroy(&self, id: &str) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    /// Sweep expired sessions. Call periodically.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.expires_at > now);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generate a random session id (hex-encoded).
fn generate_session_id() -> String {
    let bytes: [u8; SESSION_ID_BYTES] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_load_empty_session() {
        let store = SessionStore::new(60);
        let id = store.create();
        assert_eq!(id.len(), SESSION_ID_BYTES * 2);

        let data = store.load(&id).unwrap();
        assert!(!data.is_logged_in());
        assert!(data.flashes.is_empty());
    }

    #[test]
    fn session_ids_are_unique() {
        let store = SessionStore::new(60);
        assert_ne!(store.create(), store.create());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn update_persists_changes() {
        let store = SessionStore::new(60);
        let id = store.create();
        store.update(&id, |s| s.user_id = Some(3)).unwrap();
        assert_eq!(store.load(&id).unwrap().user_id, Some(3));
    }

    #[test]
    fn unknown_session_is_none() {
        let store = SessionStore::new(60);
        assert!(store.load("missing").is_none());
        assert!(store.update("missing", |_| ()).is_none());
        assert!(!store.contains("missing"));
    }

    #[test]
    fn destroy_removes_session() {
        let store = SessionStore::new(60);
        let id = store.create();
        assert!(store.destroy(&id));
        assert!(!store.destroy(&id));
        assert!(store.load(&id).is_none());
    }

    #[test]
    fn expired_sessions_are_swept() {
        let store = SessionStore::new(60);
        let live = store.create();
        let stale = store.create();
        {
            let mut slots = store.slots.lock();
            slots.get_mut(&stale).unwrap().expires_at = Instant::now()
                .checked_sub(Duration::from_secs(1))
                .unwrap();
        }
        assert!(!store.contains(&stale));
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.contains(&live));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_or_revive_recreates_missing_session() {
        let store = SessionStore::new(60);
        let id = store.create();
        store.update(&id, |s| s.user_id = Some(7));
        assert_eq!(store.update_or_revive(&id, |s| s.user_id), Some(7));

        store.destroy(&id);
        assert_eq!(store.update_or_revive(&id, |s| s.user_id), None);
        assert!(store.contains(&id));
    }

    #[test]
    fn session_count_is_capped_oldest_first() {
        let store = SessionStore::new(60).with_max_sessions(3);
        let first = store.create();
        let second = store.create();
        let third = store.create();
        // touch the first so the second becomes least recently used
        store.update(&first, |_| ());
        {
            let mut slots = store.slots.lock();
            slots.get_mut(&second).unwrap().expires_at -= Duration::from_millis(10);
        }

        let fourth = store.create();
        assert_eq!(store.len(), 3);
        assert!(!store.contains(&second));
        for id in [&first, &third, &fourth] {
            assert!(store.contains(id));
        }

        for _ in 0..100 {
            store.create();
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn rotate_moves_data_to_new_id() {
        let store = SessionStore::new(60);
        let old = store.create();
        let mut data = store.load(&old).unwrap();
        data.user_id = Some(5);

        let new = store.rotate(&old, data);
        assert_ne!(new, old);
        assert!(!store.contains(&old));
        assert_eq!(store.load(&new).unwrap().user_id, Some(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn flashes_are_taken_once() {
        let mut data = SessionData::default();
        data.flash(FlashCategory::Success, "hello");
        data.flash(FlashCategory::Error, "oops");

        let taken = data.take_flashes();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].category, FlashCategory::Success);
        assert!(data.take_flashes().is_empty());
    }

    #[test]
    fn flash_queue_is_bounded() {
        let mut data = SessionData::default();
        for i in 0..(MAX_FLASHES + 4) {
            data.flash(FlashCategory::Info, format!("msg {i}"));
        }
        assert_eq!(data.flashes.len(), MAX_FLASHES);
        assert_eq!(data.flashes[0].message, "msg 4");
    }

    #[test]
    fn clear_resets_everything() {
        let mut data = SessionData {
            user_id: Some(1),
            next_url: Some("/x".into()),
            pending_login: Some(PendingLogin {
                provider: "sso".into(),
                state: "abc".into(),
            }),
            ..SessionData::default()
        };
        data.flash(FlashCategory::Info, "x");
        data.clear();
        assert!(!data.is_logged_in());
        assert!(data.flashes.is_empty());
        assert!(data.pending_login.is_none());
        assert!(data.next_url.is_none());
    }
}
