//! SQLite-backed user and identity store.
//!
//! Tables:
//! - `users`: id, name, email, affiliation, node_id
//! - `identities`: id, user_id, provider, identifier, multipass_data, password
//!
//! `(provider, identifier)` is unique: one provider binding maps to at most
//! one identity row.

use anyhow::{bail, Result};
use parking_lot::Mutex;
use rusqlite::OptionalExtension;
use std::fmt;
use std::path::Path;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub affiliation: Option<String>,
    pub node_id: Option<i64>,
}

impl User {
    /// Name shown in notifications: the user's name, else email, else id.
    pub fn display_name(&self) -> String {
        [self.name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("user #{}", self.id))
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<User id={}, name={}, email={}>",
            self.id,
            self.name.as_deref().unwrap_or("None"),
            self.email.as_deref().unwrap_or("None"),
        )
    }
}

/// One provider binding of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub identifier: String,
    /// Serialized provider metadata from the most recent login.
    pub multipass_data: Option<String>,
    pub password: Option<String>,
}

/// Profile fields used when a user has to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub affiliation: Option<String>,
    pub node_id: Option<i64>,
}

/// Outcome of [`IdentityStore::resolve_identity`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub user: User,
    pub identity: Identity,
    pub created_user: bool,
    pub created_identity: bool,
}

/// SQLite-backed user/identity store.
pub struct IdentityStore {
    conn: Mutex<rusqlite::Connection>,
}

const USER_COLUMNS: &str = "id, name, email, affiliation, node_id";
const IDENTITY_COLUMNS: &str = "id, user_id, provider, identifier, multipass_data, password";

impl IdentityStore {
    /// Open (or create) the database at the given path.
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init(conn)
    }

    /// In-memory store (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                email TEXT,
                affiliation TEXT,
                node_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email COLLATE NOCASE);

            CREATE TABLE IF NOT EXISTS identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                identifier TEXT NOT NULL,
                multipass_data TEXT,
                password TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_identities_provider_identifier
                ON identities(provider, identifier);
            CREATE INDEX IF NOT EXISTS idx_identities_user ON identities(user_id);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Identity resolution ─────────────────────────────────────────

    /// Resolve a provider binding to a user, creating rows as needed.
    ///
    /// Runs in one transaction: find the identity by `(provider, identifier)`;
    /// otherwise find the user by email or create it from `profile`, then
    /// bind a new identity to it. The identity's metadata blob is always
    /// overwritten with `multipass_data`.
    pub fn resolve_identity(
        &self,
        provider: &str,
        identifier: &str,
        profile: &NewUser,
        multipass_data: &str,
    ) -> Result<Resolution> {
        if provider.trim().is_empty() || identifier.trim().is_empty() {
            bail!("Provider and identifier cannot be empty");
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {IDENTITY_COLUMNS} FROM identities
                     WHERE provider = ?1 AND identifier = ?2"
                ),
                rusqlite::params![provider, identifier],
                identity_from_row,
            )
            .optional()?;

        let (user, identity_id, created_user, created_identity) = match existing {
            Some(identity) => {
                let user = tx.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    rusqlite::params![identity.user_id],
                    user_from_row,
                )?;
                (user, identity.id, false, false)
            }
            None => {
                let found = match profile.email.as_deref() {
                    Some(email) => tx
                        .query_row(
                            &format!(
                                "SELECT {USER_COLUMNS} FROM users
                                 WHERE email = ?1 COLLATE NOCASE
                                 ORDER BY id ASC LIMIT 1"
                            ),
                            rusqlite::params![email.trim()],
                            user_from_row,
                        )
                        .optional()?,
                    None => None,
                };

                let (user, created_user) = match found {
                    Some(user) => (user, false),
                    None => {
                        tx.execute(
                            "INSERT INTO users (name, email, affiliation, node_id)
                             VALUES (?1, ?2, ?3, ?4)",
                            rusqlite::params![
                                profile.name,
                                profile.email.as_deref().map(str::trim),
                                profile.affiliation,
                                profile.node_id,
                            ],
                        )?;
                        let user = User {
                            id: tx.last_insert_rowid(),
                            name: profile.name.clone(),
                            email: profile.email.as_deref().map(|e| e.trim().to_string()),
                            affiliation: profile.affiliation.clone(),
                            node_id: profile.node_id,
                        };
                        (user, true)
                    }
                };

                tx.execute(
                    "INSERT INTO identities (user_id, provider, identifier)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![user.id, provider, identifier],
                )?;
                (user, tx.last_insert_rowid(), created_user, true)
            }
        };

        tx.execute(
            "UPDATE identities SET multipass_data = ?1 WHERE id = ?2",
            rusqlite::params![multipass_data, identity_id],
        )?;

        let identity = tx.query_row(
            &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1"),
            rusqlite::params![identity_id],
            identity_from_row,
        )?;

        tx.commit()?;

        Ok(Resolution {
            user,
            identity,
            created_user,
            created_identity,
        })
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Look up a user by ID.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                rusqlite::params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Oldest user with the given email (case-insensitive).
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users
                     WHERE email = ?1 COLLATE NOCASE
                     ORDER BY id ASC LIMIT 1"
                ),
                rusqlite::params![email.trim()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Identity bound to `(provider, identifier)`, if any.
    pub fn find_identity(&self, provider: &str, identifier: &str) -> Result<Option<Identity>> {
        let conn = self.conn.lock();
        let identity = conn
            .query_row(
                &format!(
                    "SELECT {IDENTITY_COLUMNS} FROM identities
                     WHERE provider = ?1 AND identifier = ?2"
                ),
                rusqlite::params![provider, identifier],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    /// List all identities of a user.
    pub fn list_identities(&self, user_id: i64) -> Result<Vec<Identity>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities
             WHERE user_id = ?1 ORDER BY id ASC"
        ))?;
        let identities = stmt
            .query_map(rusqlite::params![user_id], identity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(identities)
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Count provider bindings.
    pub fn identity_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        affiliation: row.get(3)?,
        node_id: row.get(4)?,
    })
}

fn identity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        identifier: row.get(3)?,
        multipass_data: row.get(4)?,
        password: row.get(5)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
