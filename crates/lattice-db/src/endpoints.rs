use crate::{now_db_text, DbError, DbPool};
use lattice_models::channel::{AutoBanLevel, ChannelKind, Endpoint};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct EndpointRow {
    pub id: i64,
    pub guild_id: i64,
    pub channel_id: i64,
    pub kind: ChannelKind,
    pub credential: String,
    pub important_role_id: Option<i64>,
    pub auto_ban_level: AutoBanLevel,
    pub created_at: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for EndpointRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind_raw: String = row.try_get("channel_kind")?;
        let level_raw: String = row.try_get("auto_ban_level")?;
        Ok(Self {
            id: row.try_get("id")?,
            guild_id: row.try_get("guild_id")?,
            channel_id: row.try_get("channel_id")?,
            kind: ChannelKind::parse(&kind_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid channel kind '{kind_raw}'"))
            })?,
            credential: row.try_get("credential")?,
            important_role_id: row.try_get("important_role_id")?,
            auto_ban_level: AutoBanLevel::parse(&level_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid auto ban level '{level_raw}'"))
            })?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<EndpointRow> for Endpoint {
    fn from(row: EndpointRow) -> Self {
        Self {
            id: row.id,
            guild_id: row.guild_id,
            channel_id: row.channel_id,
            kind: row.kind,
            credential: row.credential,
            important_role_id: row.important_role_id,
            auto_ban_level: row.auto_ban_level,
        }
    }
}

pub async fn register_endpoint(pool: &DbPool, endpoint: &Endpoint) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO endpoints (id, guild_id, channel_id, channel_kind, credential, important_role_id, auto_ban_level, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(endpoint.id)
    .bind(endpoint.guild_id)
    .bind(endpoint.channel_id)
    .bind(endpoint.kind.as_str())
    .bind(&endpoint.credential)
    .bind(endpoint.important_role_id)
    .bind(endpoint.auto_ban_level.as_str())
    .bind(now_db_text())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_endpoint(pool: &DbPool, endpoint_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM endpoints WHERE id = ?1")
        .bind(endpoint_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_guild_endpoints(pool: &DbPool, guild_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM endpoints WHERE guild_id = ?1")
        .bind(guild_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_endpoints(pool: &DbPool) -> Result<Vec<EndpointRow>, DbError> {
    let rows = sqlx::query_as::<_, EndpointRow>(
        "SELECT id, guild_id, channel_id, channel_kind, credential, important_role_id, auto_ban_level, created_at
         FROM endpoints ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_endpoint(pool: &DbPool, endpoint_id: i64) -> Result<Option<EndpointRow>, DbError> {
    let row = sqlx::query_as::<_, EndpointRow>(
        "SELECT id, guild_id, channel_id, channel_kind, credential, important_role_id, auto_ban_level, created_at
         FROM endpoints WHERE id = ?1",
    )
    .bind(endpoint_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_endpoint_by_channel(
    pool: &DbPool,
    channel_id: i64,
) -> Result<Option<EndpointRow>, DbError> {
    let row = sqlx::query_as::<_, EndpointRow>(
        "SELECT id, guild_id, channel_id, channel_kind, credential, important_role_id, auto_ban_level, created_at
         FROM endpoints WHERE channel_id = ?1",
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_endpoint_by_credential(
    pool: &DbPool,
    credential: &str,
) -> Result<Option<EndpointRow>, DbError> {
    let row = sqlx::query_as::<_, EndpointRow>(
        "SELECT id, guild_id, channel_id, channel_kind, credential, important_role_id, auto_ban_level, created_at
         FROM endpoints WHERE credential = ?1",
    )
    .bind(credential)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn endpoint(id: i64, guild_id: i64, channel_id: i64, kind: ChannelKind) -> Endpoint {
        Endpoint {
            id,
            guild_id,
            channel_id,
            kind,
            credential: format!("cred-{id}"),
            important_role_id: None,
            auto_ban_level: AutoBanLevel::None,
        }
    }

    #[tokio::test]
    async fn register_and_list_endpoints() {
        let pool = test_pool().await;
        register_endpoint(&pool, &endpoint(1, 10, 100, ChannelKind::General))
            .await
            .unwrap();
        register_endpoint(&pool, &endpoint(2, 20, 200, ChannelKind::Banshare))
            .await
            .unwrap();

        let rows = list_endpoints(&pool).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, ChannelKind::General);
        assert_eq!(rows[1].kind, ChannelKind::Banshare);
    }

    #[tokio::test]
    async fn channel_binding_is_unique() {
        let pool = test_pool().await;
        register_endpoint(&pool, &endpoint(1, 10, 100, ChannelKind::General))
            .await
            .unwrap();
        let err = register_endpoint(&pool, &endpoint(2, 20, 100, ChannelKind::General)).await;
        assert!(err.is_err(), "second endpoint on channel 100 must fail");
    }

    #[tokio::test]
    async fn remove_guild_endpoints_clears_all_bindings() {
        let pool = test_pool().await;
        register_endpoint(&pool, &endpoint(1, 10, 100, ChannelKind::General))
            .await
            .unwrap();
        register_endpoint(&pool, &endpoint(2, 10, 101, ChannelKind::Banshare))
            .await
            .unwrap();
        register_endpoint(&pool, &endpoint(3, 20, 200, ChannelKind::General))
            .await
            .unwrap();

        let removed = remove_guild_endpoints(&pool, 10).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(list_endpoints(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookup_by_credential() {
        let pool = test_pool().await;
        register_endpoint(&pool, &endpoint(1, 10, 100, ChannelKind::Staff))
            .await
            .unwrap();
        let found = get_endpoint_by_credential(&pool, "cred-1").await.unwrap();
        assert_eq!(found.map(|e| e.id), Some(1));
        assert!(get_endpoint_by_credential(&pool, "cred-9")
            .await
            .unwrap()
            .is_none());
    }
}
