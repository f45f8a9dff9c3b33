use crate::{now_db_text, DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LogicalMessageRow {
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub snippet: String,
    pub source_channel_id: i64,
    pub source_message_id: i64,
    pub reply_to: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageCopyRow {
    pub logical_id: i64,
    pub endpoint_id: i64,
    pub physical_id: i64,
    pub guild_id: i64,
    pub created_at: String,
}

#[allow(clippy::too_many_arguments)]
pub async fn create_logical_message(
    pool: &DbPool,
    id: i64,
    author_id: i64,
    author_name: &str,
    snippet: &str,
    source_channel_id: i64,
    source_message_id: i64,
    reply_to: Option<i64>,
) -> Result<LogicalMessageRow, DbError> {
    let row = sqlx::query_as::<_, LogicalMessageRow>(
        "INSERT INTO logical_messages (id, author_id, author_name, snippet, source_channel_id, source_message_id, reply_to, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING id, author_id, author_name, snippet, source_channel_id, source_message_id, reply_to, created_at",
    )
    .bind(id)
    .bind(author_id)
    .bind(author_name)
    .bind(snippet)
    .bind(source_channel_id)
    .bind(source_message_id)
    .bind(reply_to)
    .bind(now_db_text())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_logical_message(
    pool: &DbPool,
    id: i64,
) -> Result<Option<LogicalMessageRow>, DbError> {
    let row = sqlx::query_as::<_, LogicalMessageRow>(
        "SELECT id, author_id, author_name, snippet, source_channel_id, source_message_id, reply_to, created_at
         FROM logical_messages WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Keep the reply-preview snippet in sync after an edit.
pub async fn update_snippet(pool: &DbPool, id: i64, snippet: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE logical_messages SET snippet = ?2 WHERE id = ?1")
        .bind(id)
        .bind(snippet)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_copy(
    pool: &DbPool,
    logical_id: i64,
    endpoint_id: i64,
    physical_id: i64,
    guild_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO message_copies (logical_id, endpoint_id, physical_id, guild_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (logical_id, endpoint_id) DO NOTHING",
    )
    .bind(logical_id)
    .bind(endpoint_id)
    .bind(physical_id)
    .bind(guild_id)
    .bind(now_db_text())
    .execute(pool)
    .await?;
    Ok(())
}

/// Resolve which logical message a physical message belongs to.
/// A miss means the message predates network membership or was never
/// relayed; callers treat it as a no-op.
pub async fn find_logical_id(
    pool: &DbPool,
    endpoint_id: i64,
    physical_id: i64,
) -> Result<Option<i64>, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT logical_id FROM message_copies WHERE endpoint_id = ?1 AND physical_id = ?2",
    )
    .bind(endpoint_id)
    .bind(physical_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

/// Resolve a physical id that is not a copy but the original inbound
/// message a logical message was created from.
pub async fn find_logical_by_source(
    pool: &DbPool,
    source_channel_id: i64,
    source_message_id: i64,
) -> Result<Option<i64>, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM logical_messages WHERE source_channel_id = ?1 AND source_message_id = ?2",
    )
    .bind(source_channel_id)
    .bind(source_message_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

pub async fn list_copies(pool: &DbPool, logical_id: i64) -> Result<Vec<MessageCopyRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageCopyRow>(
        "SELECT logical_id, endpoint_id, physical_id, guild_id, created_at
         FROM message_copies WHERE logical_id = ?1 ORDER BY endpoint_id",
    )
    .bind(logical_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Purge a logical message with its copies and reaction votes. The only
/// path that deletes correlation rows, so no logical id outlives its
/// last copy.
pub async fn delete_logical_message(pool: &DbPool, logical_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM message_copies WHERE logical_id = ?1")
        .bind(logical_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM reaction_votes WHERE logical_id = ?1")
        .bind(logical_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM logical_messages WHERE id = ?1")
        .bind(logical_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
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
    async fn logical_message_round_trip() {
        let pool = test_pool().await;
        let created = create_logical_message(&pool, 5, 42, "alice", "hello", 100, 900, None)
            .await
            .unwrap();
        assert_eq!(created.author_name, "alice");

        let loaded = get_logical_message(&pool, 5).await.unwrap().unwrap();
        assert_eq!(loaded.snippet, "hello");
        assert_eq!(loaded.reply_to, None);
        assert!(get_logical_message(&pool, 6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn copies_resolve_back_to_their_logical_id() {
        let pool = test_pool().await;
        create_logical_message(&pool, 5, 42, "alice", "hello", 100, 900, None)
            .await
            .unwrap();
        record_copy(&pool, 5, 1, 901, 10).await.unwrap();
        record_copy(&pool, 5, 2, 902, 20).await.unwrap();

        assert_eq!(find_logical_id(&pool, 1, 901).await.unwrap(), Some(5));
        assert_eq!(find_logical_id(&pool, 2, 902).await.unwrap(), Some(5));
        assert_eq!(find_logical_id(&pool, 1, 999).await.unwrap(), None);
        assert_eq!(find_logical_by_source(&pool, 100, 900).await.unwrap(), Some(5));
        assert_eq!(find_logical_by_source(&pool, 100, 901).await.unwrap(), None);

        let copies = list_copies(&pool, 5).await.unwrap();
        assert_eq!(copies.len(), 2);
    }

    #[tokio::test]
    async fn recording_the_same_copy_twice_is_idempotent() {
        let pool = test_pool().await;
        create_logical_message(&pool, 5, 42, "alice", "hello", 100, 900, None)
            .await
            .unwrap();
        record_copy(&pool, 5, 1, 901, 10).await.unwrap();
        record_copy(&pool, 5, 1, 901, 10).await.unwrap();
        assert_eq!(list_copies(&pool, 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_purges_copies_and_votes() {
        let pool = test_pool().await;
        create_logical_message(&pool, 5, 42, "alice", "hello", 100, 900, None)
            .await
            .unwrap();
        record_copy(&pool, 5, 1, 901, 10).await.unwrap();
        record_copy(&pool, 5, 2, 902, 20).await.unwrap();
        crate::reaction_votes::toggle_vote(&pool, 5, 7, "👍")
            .await
            .unwrap();

        delete_logical_message(&pool, 5).await.unwrap();

        assert!(list_copies(&pool, 5).await.unwrap().is_empty());
        assert!(get_logical_message(&pool, 5).await.unwrap().is_none());
        assert!(crate::reaction_votes::count_votes(&pool, 5)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(find_logical_id(&pool, 1, 901).await.unwrap(), None);
    }

    #[tokio::test]
    async fn snippet_update_is_visible_to_later_reads() {
        let pool = test_pool().await;
        create_logical_message(&pool, 5, 42, "alice", "hello", 100, 900, None)
            .await
            .unwrap();
        update_snippet(&pool, 5, "hello there").await.unwrap();
        let row = get_logical_message(&pool, 5).await.unwrap().unwrap();
        assert_eq!(row.snippet, "hello there");
    }
}
