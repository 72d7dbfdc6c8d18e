use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth;
use crate::models::{PresenceStatus, UserRow, UserSummary};

/// Presence Registry: per-user online/offline flag and last-seen timestamp.
/// Connection handles live in the `ConnectionDirectory`, not here; the two
/// are updated together by the connection lifecycle.
pub struct PresenceService;

impl PresenceService {
    /// Validate a bearer credential and load the identity behind it. A bad
    /// token is `Unauthorized`; a valid token whose user row has vanished is
    /// `NotFound`. Both reject the handshake.
    pub async fn authenticate(db: &Pool<Postgres>, token: &str) -> AppResult<UserRow> {
        let user_id = auth::verify_token(token)?;
        Self::fetch_user(db, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn fetch_user(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, profile_image_url, is_online, last_online, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn user_summary(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<Option<UserSummary>> {
        let row = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email, profile_image_url FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn mark_connected(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_online = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn mark_disconnected(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET is_online = FALSE, last_online = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Client-driven override (e.g. app backgrounded). Stamps `last_online`
    /// only on the transition to offline, never when coming online.
    pub async fn set_explicit_status(
        db: &Pool<Postgres>,
        user_id: Uuid,
        is_online: bool,
    ) -> AppResult<()> {
        if is_online {
            Self::mark_connected(db, user_id).await
        } else {
            Self::mark_disconnected(db, user_id).await
        }
    }

    pub async fn query_status(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<PresenceStatus> {
        let user = Self::fetch_user(db, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        Ok(PresenceStatus {
            user_id: user.id,
            name: user.name,
            is_online: user.is_online,
            last_online: user.last_online,
        })
    }

    /// Presence of a set of users, for `conversationParticipantsStatus`.
    pub async fn statuses_of(
        db: &Pool<Postgres>,
        user_ids: &[Uuid],
    ) -> AppResult<Vec<PresenceStatus>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, profile_image_url, is_online, last_online, created_at, updated_at \
             FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|u| PresenceStatus {
                user_id: u.id,
                name: u.name,
                is_online: u.is_online,
                last_online: u.last_online,
            })
            .collect())
    }
}
