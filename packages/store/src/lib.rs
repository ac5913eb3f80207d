pub mod models;
pub mod repo;

mod memory;
pub use memory::MemoryStore;

pub use models::{
    AuditEntry, NewNote, NewUser, Note, NoteChanges, NoteId, User, UserId, UserInfo,
    DEFAULT_NOTE_TITLE,
};
pub use repo::{AuditStore, CredentialStore, NoteStore, StoreError, StoreResult};
