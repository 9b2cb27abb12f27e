//! # Deposit Return Repository
//!
//! Empties handed back at the counter. Rows are append-only: a booked
//! return is never edited or deleted.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::DepositReturn;

const RETURN_COLUMNS: &str =
    "id, product_id, name_snapshot, quantity, deposit_cents, returned_by, returned_at";

pub(crate) async fn insert(conn: &mut SqliteConnection, ret: &DepositReturn) -> DbResult<()> {
    debug!(
        id = %ret.id,
        product_id = %ret.product_id,
        quantity = ret.quantity,
        amount = %ret.amount(),
        "Inserting deposit return"
    );

    sqlx::query(
        r#"
        INSERT INTO deposit_returns (
            id, product_id, name_snapshot, quantity, deposit_cents, returned_by, returned_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&ret.id)
    .bind(&ret.product_id)
    .bind(&ret.name_snapshot)
    .bind(ret.quantity)
    .bind(ret.deposit_cents)
    .bind(ret.returned_by)
    .bind(ret.returned_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Read-side access to deposit returns.
#[derive(Debug, Clone)]
pub struct DepositRepository {
    pool: SqlitePool,
}

impl DepositRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DepositRepository { pool }
    }

    /// Returns booked in `[start, end)`, oldest first.
    pub async fn list_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Vec<DepositReturn>> {
        let sql = format!(
            "SELECT {} FROM deposit_returns WHERE returned_at >= ?1 AND returned_at < ?2 ORDER BY returned_at, id",
            RETURN_COLUMNS
        );
        let returns = sqlx::query_as::<_, DepositReturn>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = returns.len(), "Loaded deposit returns in range");
        Ok(returns)
    }
}
