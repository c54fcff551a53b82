//! # Sale Repository
//!
//! Committed sales, their frozen lines and tenders, and reversals.
//!
//! ## Sale Rows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       One Committed Sale                                │
//! │                                                                         │
//! │  sales          id, folio, shift_id, customer_id, subtotal, tax, total │
//! │   ├── sale_lines    (sale_id, position) → sku, name, price, qty        │
//! │   ├── sale_tenders  (sale_id, method)   → amount                       │
//! │   └── sale_reversals (sale_id UNIQUE)   → at most one, full reversal   │
//! │                                                                         │
//! │  All rows of a sale are written inside the commit transaction; a       │
//! │  reader never sees a sale without its lines.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{Money, Sale, SaleLine, SaleReversal, Tender};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Header row of a sale, before lines and tenders are attached.
#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    folio: String,
    shift_id: String,
    customer_id: Option<String>,
    subtotal: Money,
    tax: Money,
    total: Money,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_sale(self, lines: Vec<SaleLine>, tenders: Vec<Tender>) -> Sale {
        Sale {
            id: self.id,
            folio: self.folio,
            shift_id: self.shift_id,
            customer_id: self.customer_id,
            lines,
            tenders,
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
            created_at: self.created_at,
        }
    }
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Sales of a shift in commit order.
    pub async fn list_for_shift(&self, shift_id: &str) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, folio, shift_id, customer_id, subtotal, tax, total, created_at
            FROM sales
            WHERE shift_id = ?1
            ORDER BY created_at, folio
            "#,
        )
        .bind(shift_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut sales = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = Self::lines_in(&mut conn, &row.id).await?;
            let tenders = Self::tenders_in(&mut conn, &row.id).await?;
            sales.push(row.into_sale(lines, tenders));
        }

        Ok(sales)
    }

    pub async fn reversal_for(&self, sale_id: &str) -> DbResult<Option<SaleReversal>> {
        let reversal = sqlx::query_as::<_, SaleReversal>(
            "SELECT id, sale_id, reason, created_at FROM sale_reversals WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reversal)
    }

    // =========================================================================
    // Transactional steps
    // =========================================================================

    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, folio, shift_id, customer_id, subtotal, tax, total, created_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = Self::lines_in(conn, &row.id).await?;
        let tenders = Self::tenders_in(conn, &row.id).await?;
        Ok(Some(row.into_sale(lines, tenders)))
    }

    /// Next receipt number for a shift: `YYYYMMDD-<shift prefix>-NNNN`.
    ///
    /// Unique because the sequence is per shift and `folio` is UNIQUE.
    pub async fn next_folio(
        conn: &mut SqliteConnection,
        shift_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE shift_id = ?1")
            .bind(shift_id)
            .fetch_one(conn)
            .await?;

        let prefix: String = shift_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect::<String>()
            .to_uppercase();

        Ok(format!("{}-{}-{:04}", now.format("%Y%m%d"), prefix, count + 1))
    }

    /// Writes a sale with its lines and tenders.
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, folio = %sale.folio, total = %sale.total, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, folio, shift_id, customer_id, subtotal, tax, total, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.folio)
        .bind(&sale.shift_id)
        .bind(&sale.customer_id)
        .bind(sale.subtotal)
        .bind(sale.tax)
        .bind(sale.total)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await?;

        for (position, line) in sale.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (
                    sale_id, position, product_id, sku, name, unit_price, quantity, line_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&sale.id)
            .bind(position as i64)
            .bind(&line.product_id)
            .bind(&line.sku)
            .bind(&line.name)
            .bind(line.unit_price)
            .bind(line.quantity)
            .bind(line.line_total)
            .execute(&mut *conn)
            .await?;
        }

        for tender in &sale.tenders {
            sqlx::query("INSERT INTO sale_tenders (sale_id, method, amount) VALUES (?1, ?2, ?3)")
                .bind(&sale.id)
                .bind(tender.method)
                .bind(tender.amount)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Records a full reversal. A second reversal of the same sale fails
    /// with `UniqueViolation` on `sale_reversals.sale_id`.
    pub async fn insert_reversal(
        conn: &mut SqliteConnection,
        reversal: &SaleReversal,
    ) -> DbResult<()> {
        debug!(sale_id = %reversal.sale_id, "Recording sale reversal");

        sqlx::query(
            "INSERT INTO sale_reversals (id, sale_id, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&reversal.id)
        .bind(&reversal.sale_id)
        .bind(&reversal.reason)
        .bind(reversal.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn is_reversed_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sale_reversals WHERE sale_id = ?1")
                .bind(sale_id)
                .fetch_one(conn)
                .await?;

        Ok(count > 0)
    }

    async fn lines_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT product_id, sku, name, unit_price, quantity, line_total
            FROM sale_lines
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(sale_id)
        .fetch_all(conn)
        .await?;

        Ok(lines)
    }

    async fn tenders_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<Tender>> {
        let tenders = sqlx::query_as::<_, Tender>(
            "SELECT method, amount FROM sale_tenders WHERE sale_id = ?1 ORDER BY rowid",
        )
        .bind(sale_id)
        .fetch_all(conn)
        .await?;

        Ok(tenders)
    }
}
