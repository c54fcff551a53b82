//! # Bank Repository
//!
//! Bank accounts and their movement ledger.
//!
//! ## Ledger Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  balance(account) == Σ INGRESO.amount − Σ EGRESO.amount                │
//! │                                                                         │
//! │  Every movement insert is paired with `adjust_balance` in the same     │
//! │  transaction by the caller. `ledger_sum` recomputes the right-hand     │
//! │  side for audits.                                                      │
//! │                                                                         │
//! │  Movements are append-only; `conciliated` is the one mutable flag and  │
//! │  only moves false → true.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{BankAccount, BankMovement, Money, MovementOrigin};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pager::{PageCursor, PageSource, Pager};

const ACCOUNT_COLUMNS: &str = "id, name, bank, balance, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, account_id, kind, amount, concept, origin, origin_ref, \
                                conciliated, created_at, conciliated_at";

#[derive(Debug, Clone)]
pub struct BankRepository {
    pool: SqlitePool,
}

impl BankRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BankRepository { pool }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn create_account(
        &self,
        name: &str,
        bank: &str,
        now: DateTime<Utc>,
    ) -> DbResult<BankAccount> {
        let account = BankAccount {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            bank: bank.trim().to_string(),
            balance: Money::zero(),
            created_at: now,
            updated_at: now,
        };

        debug!(id = %account.id, name = %account.name, "Creating bank account");

        sqlx::query(
            r#"
            INSERT INTO bank_accounts (id, name, bank, balance, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.bank)
        .bind(account.balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(account)
    }

    pub async fn get_account(&self, id: &str) -> DbResult<Option<BankAccount>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_account_in(&mut conn, id).await
    }

    /// Σ INGRESO − Σ EGRESO over the account's ledger.
    pub async fn ledger_sum(&self, account_id: &str) -> DbResult<Money> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE kind WHEN 'INGRESO' THEN amount ELSE -amount END), 0)
            FROM bank_movements
            WHERE account_id = ?1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(sum))
    }

    // =========================================================================
    // Movements
    // =========================================================================

    pub async fn get_movement(&self, id: &str) -> DbResult<Option<BankMovement>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_movement_in(&mut conn, id).await
    }

    /// The deposit movement recorded when a shift was settled.
    pub async fn deposit_for_shift(&self, shift_id: &str) -> DbResult<Option<BankMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM bank_movements WHERE origin = ?1 AND origin_ref = ?2"
        );

        let movement = sqlx::query_as::<_, BankMovement>(&sql)
            .bind(MovementOrigin::ShiftDeposit)
            .bind(shift_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(movement)
    }

    /// Full ledger of an account, oldest first.
    pub async fn movements(&self, account_id: &str) -> DbResult<Vec<BankMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM bank_movements WHERE account_id = ?1 \
             ORDER BY created_at, id"
        );

        let movements = sqlx::query_as::<_, BankMovement>(&sql)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements not yet matched to a bank statement, oldest first.
    /// `account_id = None` lists every account.
    pub fn unconciliated(
        &self,
        account_id: Option<&str>,
        page_size: u32,
    ) -> Pager<UnconciliatedSource> {
        Pager::new(self.unconciliated_source(account_id), page_size)
    }

    pub fn unconciliated_after(
        &self,
        account_id: Option<&str>,
        page_size: u32,
        cursor: PageCursor,
    ) -> Pager<UnconciliatedSource> {
        Pager::resume(self.unconciliated_source(account_id), page_size, cursor)
    }

    fn unconciliated_source(&self, account_id: Option<&str>) -> UnconciliatedSource {
        UnconciliatedSource {
            pool: self.pool.clone(),
            account_id: account_id.map(str::to_string),
        }
    }

    // =========================================================================
    // Transactional steps
    // =========================================================================

    pub async fn get_account_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<BankAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE id = ?1");

        let account = sqlx::query_as::<_, BankAccount>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(account)
    }

    pub async fn get_movement_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<BankMovement>> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM bank_movements WHERE id = ?1");

        let movement = sqlx::query_as::<_, BankMovement>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(movement)
    }

    /// Adds a signed amount to the account balance.
    pub async fn adjust_balance(
        conn: &mut SqliteConnection,
        id: &str,
        delta: Money,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE bank_accounts SET balance = balance + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("BankAccount", id));
        }

        Ok(())
    }

    /// Appends a movement.
    ///
    /// A second SHIFT_DEPOSIT for the same shift fails with
    /// `UniqueViolation` on `bank_movements.origin_ref`.
    pub async fn insert_movement(
        conn: &mut SqliteConnection,
        movement: &BankMovement,
    ) -> DbResult<()> {
        debug!(
            id = %movement.id,
            account_id = %movement.account_id,
            amount = %movement.amount,
            "Inserting bank movement"
        );

        sqlx::query(
            r#"
            INSERT INTO bank_movements (
                id, account_id, kind, amount, concept, origin, origin_ref,
                conciliated, created_at, conciliated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.account_id)
        .bind(movement.kind)
        .bind(movement.amount)
        .bind(&movement.concept)
        .bind(movement.origin)
        .bind(&movement.origin_ref)
        .bind(movement.conciliated)
        .bind(movement.created_at)
        .bind(movement.conciliated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Flags a movement as conciliated. False if it already was (or is
    /// missing).
    pub async fn mark_conciliated(
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bank_movements
            SET conciliated = 1, conciliated_at = ?2
            WHERE id = ?1 AND conciliated = 0
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
// Unconciliated Listing
// =============================================================================

/// Keyset source over unconciliated movements ordered by `(created_at, id)`.
#[derive(Debug, Clone)]
pub struct UnconciliatedSource {
    pool: SqlitePool,
    account_id: Option<String>,
}

impl PageSource for UnconciliatedSource {
    type Item = BankMovement;

    async fn fetch_page(
        &self,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> DbResult<Vec<BankMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM bank_movements \
             WHERE conciliated = 0 \
               AND (?1 IS NULL OR account_id = ?1) \
               AND (?2 IS NULL OR created_at > ?2 OR (created_at = ?2 AND id > ?3)) \
             ORDER BY created_at, id \
             LIMIT ?4"
        );

        let rows = sqlx::query_as::<_, BankMovement>(&sql)
            .bind(self.account_id.as_deref())
            .bind(after.map(|c| c.at))
            .bind(after.map(|c| c.id.clone()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    fn cursor_of(item: &BankMovement) -> PageCursor {
        PageCursor {
            at: item.created_at,
            id: item.id.clone(),
        }
    }
}
