//! # Customer Account Repository
//!
//! Advance (prepaid) and credit balances. Debits are guarded so a balance
//! can never be driven below zero, whatever order concurrent commits land.

use caja_core::{CustomerAccount, Money};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const ACCOUNT_COLUMNS: &str =
    "id, name, advance_balance, credit_limit, credit_available, updated_at";

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Opens an account with its full credit line available.
    pub async fn create(
        &self,
        name: &str,
        credit_limit: Money,
        now: DateTime<Utc>,
    ) -> DbResult<CustomerAccount> {
        let account = CustomerAccount {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            advance_balance: Money::zero(),
            credit_limit,
            credit_available: credit_limit,
            updated_at: now,
        };

        debug!(id = %account.id, credit_limit = %credit_limit, "Creating customer account");

        sqlx::query(
            r#"
            INSERT INTO customer_accounts (
                id, name, advance_balance, credit_limit, credit_available, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(account.advance_balance)
        .bind(account.credit_limit)
        .bind(account.credit_available)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(account)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CustomerAccount>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    // =========================================================================
    // Transactional steps
    // =========================================================================

    pub async fn get_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CustomerAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM customer_accounts WHERE id = ?1");

        let account = sqlx::query_as::<_, CustomerAccount>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(account)
    }

    /// Charges `amount` to the credit line if that much is available.
    pub async fn debit_credit(
        conn: &mut SqliteConnection,
        id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customer_accounts
            SET credit_available = credit_available - ?2, updated_at = ?3
            WHERE id = ?1 AND credit_available >= ?2
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Spends `amount` of the advance balance if that much remains.
    pub async fn debit_advance(
        conn: &mut SqliteConnection,
        id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customer_accounts
            SET advance_balance = advance_balance - ?2, updated_at = ?3
            WHERE id = ?1 AND advance_balance >= ?2
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adds to the advance balance (prepayment, reversal of an ADVANCE tender).
    pub async fn credit_advance(
        conn: &mut SqliteConnection,
        id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customer_accounts
            SET advance_balance = advance_balance + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CustomerAccount", id));
        }

        Ok(())
    }

    /// Gives back `amount` of credit unless that would pass the limit.
    pub async fn restore_credit(
        conn: &mut SqliteConnection,
        id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customer_accounts
            SET credit_available = credit_available + ?2, updated_at = ?3
            WHERE id = ?1 AND credit_available + ?2 <= credit_limit
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Gives back up to `amount` of credit, stopping at the limit.
    ///
    /// Used when a CREDIT sale is reversed after the customer already paid
    /// part of the debt down.
    pub async fn release_credit(
        conn: &mut SqliteConnection,
        id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customer_accounts
            SET credit_available = MIN(credit_limit, credit_available + ?2), updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CustomerAccount", id));
        }

        Ok(())
    }
}
