//! # Product Repository
//!
//! Catalog lookup and stock levels.
//!
//! ## Stock Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                Why stock is never read-then-written                     │
//! │                                                                         │
//! │  Till A: reads stock = 1          Till B: reads stock = 1              │
//! │  Till A: writes stock = 0         Till B: writes stock = 0   ✗ oversold│
//! │                                                                         │
//! │  Instead each commit issues one conditional statement:                 │
//! │                                                                         │
//! │    UPDATE products SET stock = stock - :qty                            │
//! │     WHERE id = :id AND stock >= :qty                                   │
//! │                                                                         │
//! │  SQLite runs writers one at a time, so the second till sees            │
//! │  rows_affected = 0 and its commit rolls back with StockChanged.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{Product, Quantity};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, sku, barcode, name, unit_price, tax_inclusive, stock, \
                               is_active, created_at, updated_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// // Scanner input: id, SKU or barcode
/// let product = repo.lookup("7501000000017").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, unit_price, tax_inclusive, stock,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.unit_price)
        .bind(product.tax_inclusive)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Finds an active product by id, SKU or barcode, with its live stock.
    pub async fn lookup(&self, code: &str) -> DbResult<Option<Product>> {
        let code = code.trim();
        debug!(code = %code, "Looking up product");

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE (id = ?1 OR sku = ?1 OR barcode = ?1) AND is_active = 1 \
             LIMIT 1"
        );

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    // =========================================================================
    // Transactional steps
    // =========================================================================

    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(product)
    }

    /// Takes `qty` out of stock if at least that much remains.
    ///
    /// Returns false (and writes nothing) when stock is short or the
    /// product is missing.
    pub async fn decrement_stock(
        conn: &mut SqliteConnection,
        id: &str,
        qty: Quantity,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - ?2, updated_at = ?3
            WHERE id = ?1 AND stock >= ?2
            "#,
        )
        .bind(id)
        .bind(qty)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Puts `qty` back into stock (sale reversal).
    pub async fn increment_stock(
        conn: &mut SqliteConnection,
        id: &str,
        qty: Quantity,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(qty)
                .bind(now)
                .execute(conn)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}
