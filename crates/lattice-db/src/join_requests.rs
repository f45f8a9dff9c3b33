use crate::{now_db_text, DbError, DbPool};
use lattice_models::channel::{ChannelKind, JoinStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct JoinRequestRow {
    pub id: i64,
    pub guild_id: i64,
    pub channel_id: i64,
    pub kind: ChannelKind,
    pub requester_id: i64,
    pub status: JoinStatus,
    pub created_at: String,
    pub decided_at: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for JoinRequestRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind_raw: String = row.try_get("channel_kind")?;
        let status_raw: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            guild_id: row.try_get("guild_id")?,
            channel_id: row.try_get("channel_id")?,
            kind: ChannelKind::parse(&kind_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid channel kind '{kind_raw}'"))
            })?,
            requester_id: row.try_get("requester_id")?,
            status: JoinStatus::parse(&status_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid join status '{status_raw}'"))
            })?,
            created_at: row.try_get("created_at")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

pub async fn create_request(
    pool: &DbPool,
    id: i64,
    guild_id: i64,
    channel_id: i64,
    kind: ChannelKind,
    requester_id: i64,
) -> Result<JoinRequestRow, DbError> {
    let row = sqlx::query_as::<_, JoinRequestRow>(
        "INSERT INTO join_requests (id, guild_id, channel_id, channel_kind, requester_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id, guild_id, channel_id, channel_kind, requester_id, status, created_at, decided_at",
    )
    .bind(id)
    .bind(guild_id)
    .bind(channel_id)
    .bind(kind.as_str())
    .bind(requester_id)
    .bind(now_db_text())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_request(pool: &DbPool, id: i64) -> Result<Option<JoinRequestRow>, DbError> {
    let row = sqlx::query_as::<_, JoinRequestRow>(
        "SELECT id, guild_id, channel_id, channel_kind, requester_id, status, created_at, decided_at
         FROM join_requests WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Decide a pending request. Returns `false` when the request was already
/// decided; decisions are terminal and never retried.
pub async fn decide_request(pool: &DbPool, id: i64, status: JoinStatus) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE join_requests SET status = ?2, decided_at = ?3
         WHERE id = ?1 AND status = 'pending'",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(now_db_text())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn request_round_trip() {
        let pool = test_pool().await;
        let created = create_request(&pool, 1, 10, 100, ChannelKind::General, 7)
            .await
            .unwrap();
        assert_eq!(created.status, JoinStatus::Pending);

        let loaded = get_request(&pool, 1).await.unwrap().unwrap();
        assert_eq!(loaded.kind, ChannelKind::General);
        assert_eq!(loaded.requester_id, 7);
    }

    #[tokio::test]
    async fn decisions_are_terminal() {
        let pool = test_pool().await;
        create_request(&pool, 1, 10, 100, ChannelKind::General, 7)
            .await
            .unwrap();

        assert!(decide_request(&pool, 1, JoinStatus::Accepted).await.unwrap());
        assert!(!decide_request(&pool, 1, JoinStatus::Rejected).await.unwrap());

        let loaded = get_request(&pool, 1).await.unwrap().unwrap();
        assert_eq!(loaded.status, JoinStatus::Accepted);
        assert!(loaded.decided_at.is_some());
    }
}
