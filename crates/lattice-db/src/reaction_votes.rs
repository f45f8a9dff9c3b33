use crate::{now_db_text, DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SymbolCount {
    pub symbol: String,
    pub count: i64,
}

/// Toggle a user's vote for a symbol on a logical message.
/// Returns `true` when the vote was added, `false` when it was removed.
pub async fn toggle_vote(
    pool: &DbPool,
    logical_id: i64,
    user_id: i64,
    symbol: &str,
) -> Result<bool, DbError> {
    let inserted = sqlx::query(
        "INSERT INTO reaction_votes (logical_id, user_id, symbol, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (logical_id, user_id, symbol) DO NOTHING",
    )
    .bind(logical_id)
    .bind(user_id)
    .bind(symbol)
    .bind(now_db_text())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        return Ok(true);
    }

    sqlx::query(
        "DELETE FROM reaction_votes WHERE logical_id = ?1 AND user_id = ?2 AND symbol = ?3",
    )
    .bind(logical_id)
    .bind(user_id)
    .bind(symbol)
    .execute(pool)
    .await?;
    Ok(false)
}

/// Vote counts per symbol, ordered by first vote so rendered rows are stable.
pub async fn count_votes(pool: &DbPool, logical_id: i64) -> Result<Vec<SymbolCount>, DbError> {
    let rows = sqlx::query_as::<_, SymbolCount>(
        "SELECT symbol, COUNT(*) as count
         FROM reaction_votes WHERE logical_id = ?1
         GROUP BY symbol
         ORDER BY MIN(created_at), symbol",
    )
    .bind(logical_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn has_vote(
    pool: &DbPool,
    logical_id: i64,
    user_id: i64,
    symbol: &str,
) -> Result<bool, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM reaction_votes WHERE logical_id = ?1 AND user_id = ?2 AND symbol = ?3",
    )
    .bind(logical_id)
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}
