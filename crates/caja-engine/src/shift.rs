//! # Shift State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  NONE ──open──► ACTIVE ──close──► CLOSED ──settle──► SETTLED           │
//! │                   │ ▲                                                   │
//! │                   └─┘ record_sale_cash: expected_cash += cash           │
//! │                                                                         │
//! │  one ACTIVE per till ........ partial UNIQUE index on shifts(till_id)  │
//! │  counter increments ......... UPDATE … SET x = x + ? (never RMW)       │
//! │  close ...................... guarded on status and expected_cash     │
//! │  one deposit per shift ...... partial UNIQUE index on movements        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use caja_core::validation::validate_positive_amount;
use caja_core::{BankMovement, CoreError, Money, Shift, ShiftSummary};
use caja_db::{ShiftRepository, TillRepository};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::retry::Tx;
use crate::treasury;
use crate::EngineContext;

#[derive(Clone)]
pub struct ShiftEngine {
    ctx: Arc<EngineContext>,
}

impl ShiftEngine {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        ShiftEngine { ctx }
    }

    /// Opens a shift on `till_id`.
    ///
    /// Fails with `ShiftAlreadyActive` when the till already has one, also
    /// when another cashier wins a concurrent open.
    pub async fn open(
        &self,
        till_id: &str,
        cashier_id: &str,
        opening_float: Money,
    ) -> EngineResult<Shift> {
        let shift = self
            .ctx
            .policy
            .run_tx("open_shift", move || self.open_once(till_id, cashier_id, opening_float))
            .await?;

        info!(
            shift_id = %shift.id,
            till_id = %shift.till_id,
            cashier_id = %shift.cashier_id,
            float = %shift.opening_float,
            "Shift opened"
        );
        Ok(shift)
    }

    async fn open_once(
        &self,
        till_id: &str,
        cashier_id: &str,
        opening_float: Money,
    ) -> EngineResult<(Tx, Shift)> {
        let now = self.ctx.clock.now();
        let shift = Shift::open(
            Uuid::new_v4().to_string(),
            till_id,
            cashier_id,
            opening_float,
            now,
        )?;

        let mut tx = self.ctx.db.begin().await?;

        if TillRepository::get_in(&mut tx, till_id).await?.is_none() {
            return Err(CoreError::TillNotFound(till_id.to_string()).into());
        }

        if let Some(active) = ShiftRepository::active_for_till_in(&mut tx, till_id).await? {
            return Err(CoreError::ShiftAlreadyActive {
                till_id: till_id.to_string(),
                shift_id: active.id,
            }
            .into());
        }

        match ShiftRepository::insert(&mut tx, &shift).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation_on("till_id") => {
                // Lost the race to a concurrent open; report the winner.
                drop(tx);
                let winner = self.ctx.db.shifts().active_for_till(till_id).await?;
                return Err(CoreError::ShiftAlreadyActive {
                    till_id: till_id.to_string(),
                    shift_id: winner.map(|s| s.id).unwrap_or_default(),
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }

        Ok((tx, shift))
    }

    /// Adds a positive cash `amount` to the shift's expected cash as its
    /// own transaction.
    ///
    /// The checkout engine does the same step inside the sale commit.
    pub async fn record_sale_cash(&self, shift_id: &str, amount: Money) -> EngineResult<()> {
        validate_positive_amount("amount", amount)?;

        let ctx = &self.ctx;
        ctx.policy
            .run_tx("record_sale_cash", move || async move {
                let mut tx = ctx.db.begin().await?;
                record_sale_cash_in(&mut tx, shift_id, amount).await?;
                Ok::<_, EngineError>((tx, ()))
            })
            .await
    }

    /// Closes an ACTIVE shift with the counted cash.
    ///
    /// Returns the closed shift; `variance` = declared − (float + expected).
    pub async fn close(&self, shift_id: &str, declared_cash: Money) -> EngineResult<Shift> {
        let shift = self
            .ctx
            .policy
            .run_tx("close_shift", move || self.close_once(shift_id, declared_cash))
            .await?;

        info!(
            shift_id = %shift.id,
            declared = %declared_cash,
            variance = %shift.variance.unwrap_or_default(),
            "Shift closed"
        );
        Ok(shift)
    }

    async fn close_once(&self, shift_id: &str, declared_cash: Money) -> EngineResult<(Tx, Shift)> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.db.begin().await?;

        let mut shift = ShiftRepository::get_in(&mut tx, shift_id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()))?;

        shift.close(declared_cash, now)?;

        if !ShiftRepository::close(&mut tx, &shift).await? {
            // Still ACTIVE means a sale moved expected_cash after the read;
            // start over from a fresh read.
            let current = ShiftRepository::get_in(&mut tx, shift_id).await?;
            return match current {
                Some(current) if current.status == caja_core::ShiftStatus::Active => {
                    Err(caja_db::DbError::Busy(format!(
                        "shift {shift_id} expected cash moved during close"
                    ))
                    .into())
                }
                _ => Err(CoreError::NoActiveShift {
                    shift_id: shift_id.to_string(),
                }
                .into()),
            };
        }

        Ok((tx, shift))
    }

    /// Settles a CLOSED shift into `account_id`. Same operation as
    /// [`crate::TreasuryEngine::deposit_shift`].
    pub async fn settle(&self, shift_id: &str, account_id: &str) -> EngineResult<BankMovement> {
        treasury::settle(&self.ctx, shift_id, account_id).await
    }

    /// The till's ACTIVE shift, if any.
    pub async fn active_shift(&self, till_id: &str) -> EngineResult<Option<Shift>> {
        let ctx = &self.ctx;
        ctx.policy
            .run("active_shift", move || async move {
                Ok::<_, EngineError>(ctx.db.shifts().active_for_till(till_id).await?)
            })
            .await
    }

    pub async fn get(&self, shift_id: &str) -> EngineResult<Shift> {
        let ctx = &self.ctx;
        let shift = ctx
            .policy
            .run("get_shift", move || async move {
                Ok::<_, EngineError>(ctx.db.shifts().get_by_id(shift_id).await?)
            })
            .await?;

        shift.ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()).into())
    }

    /// X report: counts and per-method totals so far.
    pub async fn summary(&self, shift_id: &str) -> EngineResult<ShiftSummary> {
        let ctx = &self.ctx;
        let summary = ctx
            .policy
            .run("shift_summary", move || async move {
                Ok::<_, EngineError>(ctx.db.shifts().summary(shift_id).await?)
            })
            .await?;

        summary.ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()).into())
    }
}

/// Atomic `expected_cash += amount` on an ACTIVE shift. Negative amounts
/// come only from sale reversals.
pub(crate) async fn record_sale_cash_in(
    conn: &mut SqliteConnection,
    shift_id: &str,
    amount: Money,
) -> EngineResult<()> {
    if ShiftRepository::add_expected_cash(&mut *conn, shift_id, amount).await? {
        debug!(shift_id, amount = %amount, "Expected cash updated");
        return Ok(());
    }

    match ShiftRepository::get_in(conn, shift_id).await? {
        None => Err(CoreError::ShiftNotFound(shift_id.to_string()).into()),
        Some(shift) => Err(CoreError::ShiftClosed { shift_id: shift.id }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::Engine;
    use caja_core::{ShiftStatus, SystemClock};
    use caja_db::{Database, DbConfig};
    use chrono::Utc;

    async fn engine() -> (Engine, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let till = db.tills().create("Caja 1", Utc::now()).await.unwrap();
        let engine =
            Engine::with_database(db, &EngineConfig::default(), Arc::new(SystemClock)).unwrap();
        (engine, till.id)
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let (engine, till) = engine().await;
        let shifts = engine.shifts();

        let first = shifts.open(&till, "ana", Money::from_cents(50_000)).await.unwrap();
        let err = shifts.open(&till, "luis", Money::zero()).await.unwrap_err();

        match err {
            EngineError::Core(CoreError::ShiftAlreadyActive { shift_id, .. }) => {
                assert_eq!(shift_id, first.id)
            }
            other => panic!("expected ShiftAlreadyActive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_unknown_till() {
        let (engine, _) = engine().await;
        let err = engine
            .shifts()
            .open("nope", "ana", Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::TillNotFound(_))));
    }

    #[tokio::test]
    async fn test_record_cash_then_close() {
        let (engine, till) = engine().await;
        let shifts = engine.shifts();
        let shift = shifts.open(&till, "ana", Money::from_cents(50_000)).await.unwrap();

        shifts.record_sale_cash(&shift.id, Money::from_cents(5_800)).await.unwrap();
        shifts.record_sale_cash(&shift.id, Money::from_cents(5_800)).await.unwrap();

        let closed = shifts.close(&shift.id, Money::from_cents(61_000)).await.unwrap();
        assert_eq!(closed.status, ShiftStatus::Closed);
        assert_eq!(closed.expected_cash.cents(), 11_600);
        assert_eq!(closed.variance.unwrap().cents(), -600);

        let err = shifts
            .record_sale_cash(&shift.id, Money::from_cents(100))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ShiftClosed { .. })));

        let err = shifts.close(&shift.id, Money::zero()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::NoActiveShift { .. })));

        // The till is free again.
        assert!(shifts.active_shift(&till).await.unwrap().is_none());
        shifts.open(&till, "luis", Money::zero()).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_sale_cash_takes_positive_amounts_only() {
        let (engine, till) = engine().await;
        let shifts = engine.shifts();
        let shift = shifts.open(&till, "ana", Money::zero()).await.unwrap();
        shifts.record_sale_cash(&shift.id, Money::from_cents(1_000)).await.unwrap();

        for amount in [Money::zero(), Money::from_cents(-500)] {
            let err = shifts.record_sale_cash(&shift.id, amount).await.unwrap_err();
            assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
        }

        let current = shifts.get(&shift.id).await.unwrap();
        assert_eq!(current.expected_cash.cents(), 1_000);
    }

    #[tokio::test]
    async fn test_settle_requires_closed() {
        let (engine, till) = engine().await;
        let account = engine
            .db()
            .bank()
            .create_account("Operativa", "BBVA", Utc::now())
            .await
            .unwrap();
        let shift = engine
            .shifts()
            .open(&till, "ana", Money::from_cents(1_000))
            .await
            .unwrap();

        let err = engine.shifts().settle(&shift.id, &account.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ShiftNotClosed { .. })));
    }
}
