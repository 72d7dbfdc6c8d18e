use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::UserSummary;
use crate::services::PresenceService;

/// Outcome of answering a pending connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResponse {
    Accepted,
    Rejected,
}

/// Contacts and connection requests.
pub struct ContactService;

impl ContactService {
    /// Find users by email fragment. Short queries are rejected to keep the
    /// search from enumerating the user table.
    pub async fn search_users(
        db: &Pool<Postgres>,
        requester_id: Uuid,
        query: &str,
    ) -> AppResult<Vec<UserSummary>> {
        let query = query.trim();
        if query.len() < 3 {
            return Err(AppError::BadRequest(
                "Search query must be at least 3 characters".into(),
            ));
        }

        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email, profile_image_url FROM users \
             WHERE email ILIKE $1 AND id <> $2 ORDER BY email LIMIT 20",
        )
        .bind(format!("%{query}%"))
        .bind(requester_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn are_connected(db: &Pool<Postgres>, a: Uuid, b: Uuid) -> AppResult<bool> {
        let row: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM contacts WHERE user_id = $1 AND contact_id = $2",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(db)
        .await?;
        Ok(row.is_some())
    }

    /// File a connection request from `sender_id` to `recipient_id`.
    pub async fn send_request(
        db: &Pool<Postgres>,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        if sender_id == recipient_id {
            return Err(AppError::BadRequest(
                "Cannot send a connection request to yourself".into(),
            ));
        }
        if PresenceService::fetch_user(db, recipient_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".into()));
        }
        if Self::are_connected(db, sender_id, recipient_id).await? {
            return Err(AppError::BadRequest(
                "You are already connected with this user".into(),
            ));
        }

        let inserted = sqlx::query(
            "INSERT INTO connection_requests (recipient_id, sender_id) VALUES ($1, $2) \
             ON CONFLICT (recipient_id, sender_id) DO NOTHING",
        )
        .bind(recipient_id)
        .bind(sender_id)
        .execute(db)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(AppError::BadRequest(
                "Connection request already sent".into(),
            ));
        }
        Ok(())
    }

    /// Answer a pending request addressed to `recipient_id`. Accepting
    /// records the contact in both directions; either way the request row is
    /// consumed.
    pub async fn respond(
        db: &Pool<Postgres>,
        recipient_id: Uuid,
        sender_id: Uuid,
        response: ConnectionResponse,
    ) -> AppResult<()> {
        let mut tx = db.begin().await?;
        let removed = sqlx::query(
            "DELETE FROM connection_requests WHERE recipient_id = $1 AND sender_id = $2",
        )
        .bind(recipient_id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;
        if removed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound("Connection request not found".into()));
        }

        if response == ConnectionResponse::Accepted {
            sqlx::query(
                "INSERT INTO contacts (user_id, contact_id) VALUES ($1, $2), ($2, $1) \
                 ON CONFLICT (user_id, contact_id) DO NOTHING",
            )
            .bind(recipient_id)
            .bind(sender_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Pending requests addressed to the user, sender profiles populated.
    pub async fn list_requests(
        db: &Pool<Postgres>,
        recipient_id: Uuid,
    ) -> AppResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.name, u.email, u.profile_image_url \
             FROM connection_requests cr JOIN users u ON u.id = cr.sender_id \
             WHERE cr.recipient_id = $1 ORDER BY cr.created_at DESC",
        )
        .bind(recipient_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn list_contacts(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.name, u.email, u.profile_image_url \
             FROM contacts c JOIN users u ON u.id = c.contact_id \
             WHERE c.user_id = $1 ORDER BY u.name",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
