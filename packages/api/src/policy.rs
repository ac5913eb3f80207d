//! Note access policy.
//!
//! A pure function of the note's owner, its `shared` flag and the acting
//! principal:
//!
//! | Action | Allowed when |
//! |--------|--------------|
//! | read   | principal owns the note, or the note is shared |
//! | update | principal owns the note |
//! | delete | principal owns the note |
//!
//! Any authenticated principal may create notes. A missing note is reported
//! before ownership is looked at, so callers see `NotFound` and `Forbidden` as
//! distinct outcomes.

use store::{Note, UserId};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteAction {
    Read,
    Update,
    Delete,
}

pub fn allows(principal: UserId, note: &Note, action: NoteAction) -> bool {
    let owner = note.owner_id == principal;
    match action {
        NoteAction::Read => owner || note.shared,
        NoteAction::Update | NoteAction::Delete => owner,
    }
}

/// Resolve a lookup result against the policy.
pub fn authorize(
    principal: UserId,
    note: Option<Note>,
    action: NoteAction,
) -> Result<Note, ApiError> {
    let note = note.ok_or(ApiError::NotFound("note"))?;
    if allows(principal, &note, action) {
        return Ok(note);
    }
    Err(ApiError::Forbidden(match action {
        NoteAction::Read => "note is private",
        NoteAction::Update => "only owner can update",
        NoteAction::Delete => "only owner can delete",
    }))
}

/// Keep the notes `principal` may read.
pub fn visible(principal: UserId, notes: Vec<Note>) -> Vec<Note> {
    notes
        .into_iter()
        .filter(|n| allows(principal, n, NoteAction::Read))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const ALICE: UserId = 1;
    const BOB: UserId = 2;

    fn note(owner: UserId, shared: bool) -> Note {
        Note {
            id: 10,
            owner_id: owner,
            owner_username: None,
            title: "t".into(),
            content: String::new(),
            shared,
            favorite: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_may_do_everything() {
        for shared in [false, true] {
            let n = note(ALICE, shared);
            assert!(allows(ALICE, &n, NoteAction::Read));
            assert!(allows(ALICE, &n, NoteAction::Update));
            assert!(allows(ALICE, &n, NoteAction::Delete));
        }
    }

    #[test]
    fn private_note_is_closed_to_others() {
        let n = note(ALICE, false);
        assert!(!allows(BOB, &n, NoteAction::Read));
        assert!(!allows(BOB, &n, NoteAction::Update));
        assert!(!allows(BOB, &n, NoteAction::Delete));
    }

    #[test]
    fn shared_note_is_read_only_for_others() {
        let n = note(ALICE, true);
        assert!(allows(BOB, &n, NoteAction::Read));
        assert!(!allows(BOB, &n, NoteAction::Update));
        assert!(!allows(BOB, &n, NoteAction::Delete));
    }

    #[test]
    fn missing_note_is_not_found_before_forbidden() {
        assert!(matches!(
            authorize(BOB, None, NoteAction::Delete),
            Err(ApiError::NotFound("note"))
        ));
        assert!(matches!(
            authorize(BOB, Some(note(ALICE, true)), NoteAction::Update),
            Err(ApiError::Forbidden(_))
        ));
        assert!(authorize(BOB, Some(note(ALICE, true)), NoteAction::Read).is_ok());
    }

    #[test]
    fn visible_keeps_owned_and_shared() {
        let mut own = note(BOB, false);
        own.id = 1;
        let mut shared = note(ALICE, true);
        shared.id = 2;
        let mut private = note(ALICE, false);
        private.id = 3;
        let ids: Vec<_> = visible(BOB, vec![own, shared, private])
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
