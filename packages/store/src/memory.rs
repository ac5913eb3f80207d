use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{AuditEntry, NewNote, NewUser, Note, NoteChanges, NoteId, User, UserId};
use crate::repo::{AuditStore, CredentialStore, NoteStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    notes: BTreeMap<NoteId, Note>,
    audit: Vec<AuditEntry>,
    next_user_id: UserId,
    next_note_id: NoteId,
}

/// In-memory store for testing and local runs without PostgreSQL.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit entries written so far, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit.clone()
    }
}

impl Tables {
    fn with_owner_name(&self, mut note: Note) -> Note {
        note.owner_username = self.users.get(&note.owner_id).map(|u| u.username.clone());
        note
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::DuplicateUsername);
        }
        tables.next_user_id += 1;
        let record = User {
            id: tables.next_user_id,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            created_at: Utc::now(),
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn create_note(&self, owner: UserId, note: NewNote) -> StoreResult<Note> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&owner) {
            return Err(StoreError::UnknownOwner(owner));
        }
        tables.next_note_id += 1;
        let record = Note {
            id: tables.next_note_id,
            owner_id: owner,
            owner_username: None,
            title: note.title,
            content: note.content,
            shared: note.shared,
            favorite: note.favorite,
            updated_at: Utc::now(),
        };
        tables.notes.insert(record.id, record.clone());
        Ok(tables.with_owner_name(record))
    }

    async fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>> {
        let tables = self.tables.read().await;
        Ok(tables.notes.get(&id).cloned().map(|n| tables.with_owner_name(n)))
    }

    async fn list_visible_notes(&self, viewer: UserId) -> StoreResult<Vec<Note>> {
        let tables = self.tables.read().await;
        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|n| n.owner_id == viewer || n.shared)
            .cloned()
            .map(|n| tables.with_owner_name(n))
            .collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(notes)
    }

    async fn update_note(
        &self,
        id: NoteId,
        owner: UserId,
        changes: NoteChanges,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.notes.get_mut(&id) {
            Some(note) if note.owner_id == owner => {
                changes.apply_to(note);
                note.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_note(&self, id: NoteId, owner: UserId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables.notes.get(&id).is_some_and(|n| n.owner_id == owner);
        if owned {
            tables.notes.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn save_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.tables.write().await.audit.push(entry.clone());
        Ok(())
    }
}
