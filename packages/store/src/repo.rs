//! # Store traits: persistence seams for credentials, notes and audit entries
//!
//! The HTTP layer only ever talks to these traits, so the same handlers run
//! against PostgreSQL in production and against [`crate::MemoryStore`] in
//! tests. Implementations must enforce the invariants below themselves; the
//! callers do not pre-check them.
//!
//! ## Invariants
//!
//! - [`CredentialStore::create_user`] fails with [`StoreError::DuplicateUsername`]
//!   when the username is taken. Uniqueness lives in the store, not the caller.
//! - [`NoteStore::create_note`] fails with [`StoreError::UnknownOwner`] when the
//!   owner id does not reference an existing user.
//! - [`NoteStore::list_visible_notes`] returns notes owned by the viewer or
//!   flagged `shared`, newest `updated_at` first, ties broken by id descending.
//! - [`NoteStore::update_note`] and [`NoteStore::delete_note`] only touch rows
//!   whose owner matches; they report `false` when nothing matched.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AuditEntry, NewNote, NewUser, Note, NoteChanges, NoteId, User, UserId};

/// Failures surfaced by store implementations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,

    #[error("owner {0} does not exist")]
    UnknownOwner(UserId),

    /// The backend could not be reached (pool exhausted, connection refused, I/O).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// User identity records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>>;
}

/// CRUD over notes.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn create_note(&self, owner: UserId, note: NewNote) -> StoreResult<Note>;
    async fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>>;
    async fn list_visible_notes(&self, viewer: UserId) -> StoreResult<Vec<Note>>;
    async fn update_note(
        &self,
        id: NoteId,
        owner: UserId,
        changes: NoteChanges,
    ) -> StoreResult<bool>;
    async fn delete_note(&self, id: NoteId, owner: UserId) -> StoreResult<bool>;
}

/// Sink for captured request/response pairs.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn save_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
}
