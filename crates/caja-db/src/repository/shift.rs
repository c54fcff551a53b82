//! # Shift Repository
//!
//! Shift rows and their lifecycle transitions.
//!
//! ## Transition Guards
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert            ──► partial UNIQUE(till_id) WHERE status='active'    │
//! │                        (second open on a till → UniqueViolation)        │
//! │                                                                         │
//! │  add_expected_cash ──► WHERE id = ? AND status = 'active'               │
//! │  close             ──► WHERE id = ? AND status = 'active'               │
//! │  mark_settled      ──► WHERE id = ? AND status = 'closed'               │
//! │                                                                         │
//! │  Every guarded write returns false when the row is not in the          │
//! │  expected state, so two racing callers cannot both win.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{Money, PendingShift, Shift, ShiftStatus, ShiftSummary, Tender};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::pager::{PageCursor, PageSource, Pager};

const SHIFT_COLUMNS: &str = "id, till_id, cashier_id, status, opening_float, expected_cash, \
                             declared_cash, variance, opened_at, closed_at, settled_at";

#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// The ACTIVE shift on a till, if any.
    pub async fn active_for_till(&self, till_id: &str) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        Self::active_for_till_in(&mut conn, till_id).await
    }

    /// Sale counts and per-method tender totals for one shift (X report).
    ///
    /// Reversed sales are counted separately and excluded from the totals.
    pub async fn summary(&self, shift_id: &str) -> DbResult<Option<ShiftSummary>> {
        let Some(shift) = self.get_by_id(shift_id).await? else {
            return Ok(None);
        };

        let (sale_count, reversed_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(r.sale_id)
            FROM sales s
            LEFT JOIN sale_reversals r ON r.sale_id = s.id
            WHERE s.shift_id = ?1
            "#,
        )
        .bind(shift_id)
        .fetch_one(&self.pool)
        .await?;

        let tender_totals = sqlx::query_as::<_, Tender>(
            r#"
            SELECT t.method AS method, SUM(t.amount) AS amount
            FROM sale_tenders t
            INNER JOIN sales s ON s.id = t.sale_id
            WHERE s.shift_id = ?1
              AND NOT EXISTS (SELECT 1 FROM sale_reversals r WHERE r.sale_id = s.id)
            GROUP BY t.method
            ORDER BY t.method
            "#,
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ShiftSummary {
            shift_id: shift.id,
            status: shift.status,
            opening_float: shift.opening_float,
            expected_cash: shift.expected_cash,
            sale_count,
            reversed_count,
            tender_totals,
        }))
    }

    /// CLOSED shifts, oldest close first.
    pub fn pending(&self, page_size: u32) -> Pager<PendingShiftSource> {
        Pager::new(
            PendingShiftSource {
                pool: self.pool.clone(),
            },
            page_size,
        )
    }

    /// Continues a pending listing after `cursor`.
    pub fn pending_after(&self, page_size: u32, cursor: PageCursor) -> Pager<PendingShiftSource> {
        Pager::resume(
            PendingShiftSource {
                pool: self.pool.clone(),
            },
            page_size,
            cursor,
        )
    }

    // =========================================================================
    // Transactional steps
    // =========================================================================

    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Shift>> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?1");

        let shift = sqlx::query_as::<_, Shift>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(shift)
    }

    pub async fn active_for_till_in(
        conn: &mut SqliteConnection,
        till_id: &str,
    ) -> DbResult<Option<Shift>> {
        let sql = format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts WHERE till_id = ?1 AND status = 'active'"
        );

        let shift = sqlx::query_as::<_, Shift>(&sql)
            .bind(till_id)
            .fetch_optional(conn)
            .await?;

        Ok(shift)
    }

    /// Inserts a new shift row.
    ///
    /// Fails with `UniqueViolation` on `shifts.till_id` if the till
    /// already has an ACTIVE shift.
    pub async fn insert(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<()> {
        debug!(id = %shift.id, till_id = %shift.till_id, "Inserting shift");

        sqlx::query(
            r#"
            INSERT INTO shifts (
                id, till_id, cashier_id, status, opening_float, expected_cash,
                declared_cash, variance, opened_at, closed_at, settled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&shift.id)
        .bind(&shift.till_id)
        .bind(&shift.cashier_id)
        .bind(shift.status)
        .bind(shift.opening_float)
        .bind(shift.expected_cash)
        .bind(shift.declared_cash)
        .bind(shift.variance)
        .bind(shift.opened_at)
        .bind(shift.closed_at)
        .bind(shift.settled_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Adds a (possibly negative) amount to expected cash of an ACTIVE shift.
    pub async fn add_expected_cash(
        conn: &mut SqliteConnection,
        id: &str,
        delta: Money,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shifts
            SET expected_cash = expected_cash + ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(delta)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Persists a close computed by `Shift::close`, if still ACTIVE.
    ///
    /// The stored expected cash is compared as well: a sale that landed
    /// after the caller read the row makes this return false.
    pub async fn close(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shifts
            SET status = ?2, declared_cash = ?3, variance = ?4, closed_at = ?5
            WHERE id = ?1 AND status = 'active' AND expected_cash = ?6
            "#,
        )
        .bind(&shift.id)
        .bind(ShiftStatus::Closed)
        .bind(shift.declared_cash)
        .bind(shift.variance)
        .bind(shift.closed_at)
        .bind(shift.expected_cash)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// CLOSED → SETTLED. False if the shift was not CLOSED.
    pub async fn mark_settled(
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shifts
            SET status = 'settled', settled_at = ?2
            WHERE id = ?1 AND status = 'closed'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Pending Listing
// =============================================================================

/// Keyset source over CLOSED shifts ordered by `(closed_at, id)`.
#[derive(Debug, Clone)]
pub struct PendingShiftSource {
    pool: SqlitePool,
}

impl PageSource for PendingShiftSource {
    type Item = PendingShift;

    async fn fetch_page(
        &self,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> DbResult<Vec<PendingShift>> {
        let rows = sqlx::query_as::<_, PendingShift>(
            r#"
            SELECT
                id AS shift_id,
                till_id,
                cashier_id,
                COALESCE(declared_cash, 0) AS declared_cash,
                opening_float + expected_cash AS expected_drawer,
                COALESCE(variance, 0) AS variance,
                closed_at
            FROM shifts
            WHERE status = 'closed'
              AND (?1 IS NULL OR closed_at > ?1 OR (closed_at = ?1 AND id > ?2))
            ORDER BY closed_at, id
            LIMIT ?3
            "#,
        )
        .bind(after.map(|c| c.at))
        .bind(after.map(|c| c.id.clone()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn cursor_of(item: &PendingShift) -> PageCursor {
        PageCursor {
            at: item.closed_at,
            id: item.shift_id.clone(),
        }
    }
}
