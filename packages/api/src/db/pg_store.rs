use async_trait::async_trait;
use sqlx::PgPool;

use store::{
    AuditEntry, AuditStore, CredentialStore, NewNote, NewUser, Note, NoteChanges, NoteId, NoteStore,
    StoreError, StoreResult, User, UserId,
};

/// Columns of a note joined with its owner's username.
const NOTE_SELECT: &str = "SELECT n.id, n.owner_id, u.username AS owner_username, n.title, \
     n.content, n.shared, n.favorite, n.updated_at \
     FROM notes n JOIN users u ON u.id = n.owner_id";

/// PostgreSQL-backed implementation of every store trait.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Classify a driver error. Connectivity problems are `Unavailable`, the rest `Backend`.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash, email) VALUES ($1, $2, $3) \
             RETURNING id, username, password_hash, email, created_at",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateUsername
            } else {
                classify(e)
            }
        })
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, email, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, email, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }
}

#[async_trait]
impl NoteStore for PgStore {
    async fn create_note(&self, owner: UserId, note: NewNote) -> StoreResult<Note> {
        sqlx::query_as::<_, Note>(
            "WITH inserted AS ( \
                 INSERT INTO notes (owner_id, title, content, shared, favorite) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, owner_id, title, content, shared, favorite, updated_at \
             ) \
             SELECT i.id, i.owner_id, u.username AS owner_username, i.title, i.content, \
                    i.shared, i.favorite, i.updated_at \
             FROM inserted i JOIN users u ON u.id = i.owner_id",
        )
        .bind(owner)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.shared)
        .bind(note.favorite)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::UnknownOwner(owner)
            } else {
                classify(e)
            }
        })
    }

    async fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>> {
        sqlx::query_as::<_, Note>(&format!("{NOTE_SELECT} WHERE n.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn list_visible_notes(&self, viewer: UserId) -> StoreResult<Vec<Note>> {
        sqlx::query_as::<_, Note>(&format!(
            "{NOTE_SELECT} WHERE n.owner_id = $1 OR n.shared ORDER BY n.updated_at DESC, n.id DESC"
        ))
        .bind(viewer)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn update_note(
        &self,
        id: NoteId,
        owner: UserId,
        changes: NoteChanges,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE notes SET \
                 title = COALESCE($3, title), \
                 content = COALESCE($4, content), \
                 shared = COALESCE($5, shared), \
                 favorite = COALESCE($6, favorite), \
                 updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(changes.stored_title())
        .bind(&changes.content)
        .bind(changes.shared)
        .bind(changes.favorite)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_note(&self, id: NoteId, owner: UserId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn save_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO logs (datetime, method, endpoint, request_headers, request_payload, \
                               response_body, response_status, duration_ms, user_id) \
             VALUES ($1, $2, $3, $4::jsonb, $5, $6, $7, $8, $9)",
        )
        .bind(entry.datetime)
        .bind(&entry.method)
        .bind(&entry.endpoint)
        .bind(&entry.request_headers)
        .bind(&entry.request_payload)
        .bind(&entry.response_body)
        .bind(entry.response_status)
        .bind(entry.duration_ms)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_unavailable() {
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), StoreError::Unavailable(_)));
        assert!(matches!(classify(sqlx::Error::PoolClosed), StoreError::Unavailable(_)));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(classify(sqlx::Error::Io(io)), StoreError::Unavailable(_)));
    }

    #[test]
    fn other_errors_are_backend() {
        assert!(matches!(classify(sqlx::Error::RowNotFound), StoreError::Backend(_)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_foreign_key_violation(&sqlx::Error::RowNotFound));
    }
}
