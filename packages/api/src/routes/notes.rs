//! Note CRUD endpoints. Every decision goes through [`crate::policy`].

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use store::{NewNote, Note, NoteChanges, NoteId};

use super::Message;
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::policy::{self, NoteAction};
use crate::state::AppState;

/// Partial note body used by create and update. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub shared: Option<bool>,
    pub favorite: Option<bool>,
}

impl From<NoteRequest> for NoteChanges {
    fn from(req: NoteRequest) -> Self {
        NoteChanges {
            title: req.title,
            content: req.content,
            shared: req.shared,
            favorite: req.favorite,
        }
    }
}

fn note_id(path: Result<Path<NoteId>, PathRejection>) -> ApiResult<NoteId> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::InvalidInput("invalid note id".into()))
}

/// Notes the caller owns or that are shared, newest first.
pub async fn list(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<Vec<Note>>> {
    let notes = state
        .store(state.notes.list_visible_notes(principal.user_id))
        .await?;
    Ok(Json(policy::visible(principal.user_id, notes)))
}

pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    let Json(req) = payload?;
    let new = NewNote::new(
        req.title,
        req.content,
        req.shared.unwrap_or(false),
        req.favorite.unwrap_or(false),
    );
    let note = state
        .store(state.notes.create_note(principal.user_id, new))
        .await?;
    tracing::debug!(note_id = note.id, owner = principal.user_id, "note created");
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<NoteId>, PathRejection>,
) -> ApiResult<Json<Note>> {
    let id = note_id(path)?;
    let found = state.store(state.notes.get_note(id)).await?;
    let note = policy::authorize(principal.user_id, found, NoteAction::Read)?;
    Ok(Json(note))
}

pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<NoteId>, PathRejection>,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> ApiResult<Json<Message>> {
    let id = note_id(path)?;
    let Json(req) = payload?;
    let found = state.store(state.notes.get_note(id)).await?;
    policy::authorize(principal.user_id, found, NoteAction::Update)?;

    // The note may have been deleted between the lookup and the write.
    let updated = state
        .store(state.notes.update_note(id, principal.user_id, req.into()))
        .await?;
    if !updated {
        return Err(ApiError::NotFound("note"));
    }
    Ok(Json(Message::new("updated")))
}

pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<NoteId>, PathRejection>,
) -> ApiResult<Json<Message>> {
    let id = note_id(path)?;
    let found = state.store(state.notes.get_note(id)).await?;
    policy::authorize(principal.user_id, found, NoteAction::Delete)?;

    if !state.store(state.notes.delete_note(id, principal.user_id)).await? {
        return Err(ApiError::NotFound("note"));
    }
    Ok(Json(Message::new("deleted")))
}
