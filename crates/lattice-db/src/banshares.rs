use crate::{json_from_db_text, now_db_text, DbError, DbPool};
use lattice_models::banshare::{BanshareStatus, GuildDecision};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct BanshareCaseRow {
    pub id: i64,
    pub target_id: i64,
    pub reason: String,
    pub proof: Vec<String>,
    pub status: BanshareStatus,
    pub important: bool,
    pub review_physical_id: Option<i64>,
    pub created_at: String,
    pub decided_at: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for BanshareCaseRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let proof_raw: String = row.try_get("proof")?;
        let proof = json_from_db_text(&proof_raw)?
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            id: row.try_get("id")?,
            target_id: row.try_get("target_id")?,
            reason: row.try_get("reason")?,
            proof,
            status: BanshareStatus::parse(&status_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid banshare status '{status_raw}'"))
            })?,
            important: row.try_get::<i64, _>("important")? != 0,
            review_physical_id: row.try_get("review_physical_id")?,
            created_at: row.try_get("created_at")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GuildDecisionRow {
    pub case_id: i64,
    pub guild_id: i64,
    pub decision: GuildDecision,
    pub decided_by: Option<i64>,
    pub decided_at: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for GuildDecisionRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let decision_raw: String = row.try_get("decision")?;
        Ok(Self {
            case_id: row.try_get("case_id")?,
            guild_id: row.try_get("guild_id")?,
            decision: GuildDecision::parse(&decision_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid guild decision '{decision_raw}'"))
            })?,
            decided_by: row.try_get("decided_by")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

const CASE_COLUMNS: &str =
    "id, target_id, reason, proof, status, important, review_physical_id, created_at, decided_at";

pub async fn create_case(
    pool: &DbPool,
    id: i64,
    target_id: i64,
    reason: &str,
    proof: &[String],
) -> Result<BanshareCaseRow, DbError> {
    let proof_json = serde_json::to_string(proof)
        .map_err(|e| DbError::Sqlx(sqlx::Error::Protocol(format!("invalid proof list: {e}"))))?;
    let row = sqlx::query_as::<_, BanshareCaseRow>(&format!(
        "INSERT INTO banshare_cases (id, target_id, reason, proof, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING {CASE_COLUMNS}",
    ))
    .bind(id)
    .bind(target_id)
    .bind(reason)
    .bind(proof_json)
    .bind(now_db_text())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_case(pool: &DbPool, id: i64) -> Result<Option<BanshareCaseRow>, DbError> {
    let row = sqlx::query_as::<_, BanshareCaseRow>(&format!(
        "SELECT {CASE_COLUMNS} FROM banshare_cases WHERE id = ?1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn set_review_message(
    pool: &DbPool,
    id: i64,
    review_physical_id: i64,
) -> Result<(), DbError> {
    sqlx::query("UPDATE banshare_cases SET review_physical_id = ?2 WHERE id = ?1")
        .bind(id)
        .bind(review_physical_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Freeze a pending case as dispatched to the network. Returns `false` when
/// the case was already decided, making dispatch idempotent.
pub async fn mark_enforced(pool: &DbPool, id: i64, important: bool) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE banshare_cases
         SET status = 'enforced', important = ?2, decided_at = ?3
         WHERE id = ?1 AND status = 'pending'",
    )
    .bind(id)
    .bind(important as i64)
    .bind(now_db_text())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reject a pending case at central review. Returns `false` when the case
/// was already decided.
pub async fn mark_rejected(pool: &DbPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE banshare_cases SET status = 'rejected', decided_at = ?2
         WHERE id = ?1 AND status = 'pending'",
    )
    .bind(id)
    .bind(now_db_text())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Toggle a reviewer's approval. Returns `true` when the approval was added.
pub async fn toggle_approval(
    pool: &DbPool,
    case_id: i64,
    approver_id: i64,
) -> Result<bool, DbError> {
    let inserted = sqlx::query(
        "INSERT INTO banshare_approvals (case_id, approver_id, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (case_id, approver_id) DO NOTHING",
    )
    .bind(case_id)
    .bind(approver_id)
    .bind(now_db_text())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        return Ok(true);
    }

    sqlx::query("DELETE FROM banshare_approvals WHERE case_id = ?1 AND approver_id = ?2")
        .bind(case_id)
        .bind(approver_id)
        .execute(pool)
        .await?;
    Ok(false)
}

pub async fn count_approvals(pool: &DbPool, case_id: i64) -> Result<i64, DbError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM banshare_approvals WHERE case_id = ?1")
            .bind(case_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

pub async fn set_guild_decision(
    pool: &DbPool,
    case_id: i64,
    guild_id: i64,
    decision: GuildDecision,
    decided_by: Option<i64>,
) -> Result<(), DbError> {
    let decided_at = (decision != GuildDecision::Pending).then(now_db_text);
    sqlx::query(
        "INSERT INTO banshare_guild_decisions (case_id, guild_id, decision, decided_by, decided_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (case_id, guild_id) DO UPDATE SET
             decision = EXCLUDED.decision,
             decided_by = EXCLUDED.decided_by,
             decided_at = EXCLUDED.decided_at",
    )
    .bind(case_id)
    .bind(guild_id)
    .bind(decision.as_str())
    .bind(decided_by)
    .bind(decided_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_guild_decision(
    pool: &DbPool,
    case_id: i64,
    guild_id: i64,
) -> Result<Option<GuildDecisionRow>, DbError> {
    let row = sqlx::query_as::<_, GuildDecisionRow>(
        "SELECT case_id, guild_id, decision, decided_by, decided_at
         FROM banshare_guild_decisions WHERE case_id = ?1 AND guild_id = ?2",
    )
    .bind(case_id)
    .bind(guild_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_guild_decisions(
    pool: &DbPool,
    case_id: i64,
) -> Result<Vec<GuildDecisionRow>, DbError> {
    let rows = sqlx::query_as::<_, GuildDecisionRow>(
        "SELECT case_id, guild_id, decision, decided_by, decided_at
         FROM banshare_guild_decisions WHERE case_id = ?1 ORDER BY guild_id",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Force every case targeting this user into `overturned` after an external
/// unban, and mark the unbanning guild's own decisions the same way. The
/// status is forced, not conditionally checked.
pub async fn overturn_for_guild(
    pool: &DbPool,
    guild_id: i64,
    target_id: i64,
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let decisions = sqlx::query(
        "UPDATE banshare_guild_decisions SET decision = 'overturned', decided_at = ?3
         WHERE guild_id = ?1
           AND decision != 'overturned'
           AND case_id IN (SELECT id FROM banshare_cases WHERE target_id = ?2)",
    )
    .bind(guild_id)
    .bind(target_id)
    .bind(now_db_text())
    .execute(&mut *tx)
    .await?
    .rows_affected();
    let cases = sqlx::query(
        "UPDATE banshare_cases SET status = 'overturned', decided_at = ?2
         WHERE target_id = ?1 AND status != 'overturned'",
    )
    .bind(target_id)
    .bind(now_db_text())
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok(decisions.max(cases))
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
    async fn case_round_trip_preserves_proof_and_status() {
        let pool = test_pool().await;
        let proof = vec!["https://proof.example/1".to_string()];
        let case = create_case(&pool, 1, 42, "spamming invites", &proof)
            .await
            .unwrap();
        assert_eq!(case.status, BanshareStatus::Pending);
        assert!(!case.important);

        let loaded = get_case(&pool, 1).await.unwrap().unwrap();
        assert_eq!(loaded.proof, proof);
        assert_eq!(loaded.reason, "spamming invites");
    }

    #[tokio::test]
    async fn mark_enforced_freezes_the_case_exactly_once() {
        let pool = test_pool().await;
        create_case(&pool, 1, 42, "reason", &[]).await.unwrap();

        assert!(mark_enforced(&pool, 1, true).await.unwrap());
        assert!(!mark_enforced(&pool, 1, true).await.unwrap());
        assert!(!mark_rejected(&pool, 1).await.unwrap());

        let case = get_case(&pool, 1).await.unwrap().unwrap();
        assert_eq!(case.status, BanshareStatus::Enforced);
        assert!(case.important);
    }

    #[tokio::test]
    async fn approval_toggle_counts_distinct_reviewers() {
        let pool = test_pool().await;
        create_case(&pool, 1, 42, "reason", &[]).await.unwrap();

        assert!(toggle_approval(&pool, 1, 7).await.unwrap());
        assert_eq!(count_approvals(&pool, 1).await.unwrap(), 1);

        // Same reviewer toggling again retracts the approval.
        assert!(!toggle_approval(&pool, 1, 7).await.unwrap());
        assert_eq!(count_approvals(&pool, 1).await.unwrap(), 0);

        toggle_approval(&pool, 1, 7).await.unwrap();
        toggle_approval(&pool, 1, 8).await.unwrap();
        assert_eq!(count_approvals(&pool, 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn guild_decisions_upsert() {
        let pool = test_pool().await;
        create_case(&pool, 1, 42, "reason", &[]).await.unwrap();

        set_guild_decision(&pool, 1, 10, GuildDecision::Pending, None)
            .await
            .unwrap();
        set_guild_decision(&pool, 1, 10, GuildDecision::Enforced, Some(7))
            .await
            .unwrap();

        let row = get_guild_decision(&pool, 1, 10).await.unwrap().unwrap();
        assert_eq!(row.decision, GuildDecision::Enforced);
        assert_eq!(row.decided_by, Some(7));
        assert!(row.decided_at.is_some());
        assert_eq!(list_guild_decisions(&pool, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unban_overturns_enforced_and_rejected_cases() {
        let pool = test_pool().await;
        create_case(&pool, 1, 42, "first", &[]).await.unwrap();
        mark_enforced(&pool, 1, false).await.unwrap();
        set_guild_decision(&pool, 1, 10, GuildDecision::Enforced, None)
            .await
            .unwrap();
        create_case(&pool, 2, 42, "second", &[]).await.unwrap();
        mark_rejected(&pool, 2).await.unwrap();

        let touched = overturn_for_guild(&pool, 10, 42).await.unwrap();
        assert!(touched > 0);

        let first = get_case(&pool, 1).await.unwrap().unwrap();
        assert_eq!(first.status, BanshareStatus::Overturned);
        let second = get_case(&pool, 2).await.unwrap().unwrap();
        assert_eq!(second.status, BanshareStatus::Overturned);
        let decision = get_guild_decision(&pool, 1, 10).await.unwrap().unwrap();
        assert_eq!(decision.decision, GuildDecision::Overturned);
    }

    #[tokio::test]
    async fn unban_for_an_unknown_target_touches_nothing() {
        let pool = test_pool().await;
        create_case(&pool, 1, 42, "reason", &[]).await.unwrap();
        let touched = overturn_for_guild(&pool, 10, 99).await.unwrap();
        assert_eq!(touched, 0);
        let case = get_case(&pool, 1).await.unwrap().unwrap();
        assert_eq!(case.status, BanshareStatus::Pending);
    }
}
