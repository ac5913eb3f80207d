//! # Domain models for users, notes and audit entries
//!
//! Defines the records persisted by the [`crate::CredentialStore`],
//! [`crate::NoteStore`] and [`crate::AuditStore`] implementations, and the
//! client-safe projections that cross the HTTP boundary.
//!
//! ## Types
//!
//! | Struct | Represents |
//! |--------|-----------|
//! | [`User`] | A full row of the `users` table, including the Argon2 PHC `password_hash`. Never serialised. |
//! | [`UserInfo`] | The wire form of a user: `{id, username, email?, createdAt}`. |
//! | [`NewUser`] | Insert payload for registration; the hash is computed by the caller. |
//! | [`Note`] | A row of the `notes` table joined with the owner's username. Serialised camelCase. |
//! | [`NewNote`] | Insert payload; the title is already defaulted by [`NewNote::new`]. |
//! | [`NoteChanges`] | Partial update: `None` fields keep their stored value. |
//! | [`AuditEntry`] | One request/response pair captured by the audit middleware. |
//!
//! With the `postgres` feature the row types derive `sqlx::FromRow`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type NoteId = i64;

/// Title given to notes created without one.
pub const DEFAULT_NOTE_TITLE: &str = "Untitled Note";

/// Full user record from the database.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Convert to UserInfo for client consumption.
    pub fn to_info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

/// User information safe to send to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration payload handed to the credential store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
}

/// A note joined with its owner's username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub owner_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_username: Option<String>,
    pub title: String,
    pub content: String,
    pub shared: bool,
    pub favorite: bool,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a note. The owner is supplied separately.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub shared: bool,
    pub favorite: bool,
}

impl NewNote {
    /// Build an insert payload, substituting [`DEFAULT_NOTE_TITLE`] for a blank title.
    pub fn new(
        title: Option<String>,
        content: Option<String>,
        shared: bool,
        favorite: bool,
    ) -> Self {
        Self {
            title: title_or_default(title),
            content: content.unwrap_or_default(),
            shared,
            favorite,
        }
    }
}

/// Partial update of a note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub shared: Option<bool>,
    pub favorite: Option<bool>,
}

impl NoteChanges {
    /// The title to store, if the title changes at all. Blank becomes [`DEFAULT_NOTE_TITLE`].
    pub fn stored_title(&self) -> Option<String> {
        self.title.clone().map(|t| title_or_default(Some(t)))
    }

    /// Apply the present fields to `note`.
    pub fn apply_to(&self, note: &mut Note) {
        if let Some(title) = self.stored_title() {
            note.title = title;
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(shared) = self.shared {
            note.shared = shared;
        }
        if let Some(favorite) = self.favorite {
            note.favorite = favorite;
        }
    }
}

fn title_or_default(title: Option<String>) -> String {
    match title {
        Some(t) if !t.trim().is_empty() => t,
        _ => DEFAULT_NOTE_TITLE.to_string(),
    }
}

/// One captured request/response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub datetime: DateTime<Utc>,
    pub method: String,
    pub endpoint: String,
    /// JSON object of request headers with credentials masked.
    pub request_headers: String,
    pub request_payload: String,
    pub response_body: String,
    pub response_status: i32,
    pub duration_ms: i32,
    pub user_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_is_defaulted() {
        let note = NewNote::new(Some("   ".into()), Some("x".into()), false, false);
        assert_eq!(note.title, DEFAULT_NOTE_TITLE);
        assert_eq!(note.content, "x");

        let note = NewNote::new(None, None, true, false);
        assert_eq!(note.title, DEFAULT_NOTE_TITLE);
        assert_eq!(note.content, "");
        assert!(note.shared);
    }

    #[test]
    fn note_serialises_camel_case() {
        let note = Note {
            id: 7,
            owner_id: 1,
            owner_username: Some("alice".into()),
            title: "t".into(),
            content: "c".into(),
            shared: true,
            favorite: false,
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["ownerId"], 1);
        assert_eq!(value["ownerUsername"], "alice");
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("owner_id").is_none());
    }

    #[test]
    fn user_info_omits_password_hash() {
        let user = User {
            id: 3,
            username: "bob".into(),
            password_hash: "$argon2id$secret".into(),
            email: None,
            created_at: Utc::now(),
        };
        let text = serde_json::to_string(&user.to_info()).unwrap();
        assert!(!text.contains("argon2"));
        assert!(!text.contains("email"));
        assert!(text.contains("createdAt"));
    }

    #[test]
    fn changes_keep_absent_fields() {
        let mut note = Note {
            id: 1,
            owner_id: 1,
            owner_username: None,
            title: "keep".into(),
            content: "old".into(),
            shared: false,
            favorite: true,
            updated_at: Utc::now(),
        };
        NoteChanges {
            content: Some("new".into()),
            shared: Some(true),
            ..Default::default()
        }
        .apply_to(&mut note);
        assert_eq!(note.title, "keep");
        assert_eq!(note.content, "new");
        assert!(note.shared);
        assert!(note.favorite);
    }
}
