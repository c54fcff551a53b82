//! # Treasury Settlement Engine
//!
//! Moves money between the shifts, customer accounts and the bank ledger.
//!
//! ## Ledger Flows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CLOSED shift ──deposit_shift──► INGRESO  SHIFT_DEPOSIT    balance +=  │
//! │                                  (origin_ref = shift id, UNIQUE)        │
//! │                                                                         │
//! │  customer pays ─post_customer_receipt─► INGRESO CUSTOMER_RECEIPT  +=   │
//! │     ADVANCE          → advance_balance += amount                        │
//! │     CREDIT_PAYMENT   → credit_available += amount (≤ credit_limit)      │
//! │                                                                         │
//! │  supplier bill ──record_egress──► EGRESO  PAYABLE          balance -=  │
//! │                                                                         │
//! │  Each flow is one transaction: movement row + balance update (+ the    │
//! │  shift or customer row). balance always equals Σ signed movements.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Receipts and egresses pick their movement id before the first attempt.
//! An attempt that finds that id already in the ledger returns the stored
//! row, so a retried posting lands once.

use std::sync::Arc;

use caja_core::validation::{validate_positive_amount, validate_text};
use caja_core::{
    BankAccount, BankMovement, CoreError, Money, MovementKind, MovementOrigin, ReceiptKind,
    ValidationError,
};
use caja_db::{BankRepository, CustomerRepository, PageCursor, PendingShiftSource, ShiftRepository};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::listing::Listing;
use crate::EngineContext;

/// Longest accepted concept on a manual movement.
const MAX_CONCEPT_LEN: usize = 200;

#[derive(Clone)]
pub struct TreasuryEngine {
    ctx: Arc<EngineContext>,
}

impl TreasuryEngine {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        TreasuryEngine { ctx }
    }

    /// CLOSED shifts awaiting deposit, oldest close first, each with its
    /// variance.
    pub fn list_pending_shifts(&self) -> Listing<PendingShiftSource> {
        let pager = self.ctx.db.shifts().pending(self.ctx.page_size);
        Listing::new(pager, self.ctx.policy, "list_pending_shifts")
    }

    /// Continues a pending-shift listing from a saved cursor.
    pub fn list_pending_after(&self, cursor: PageCursor) -> Listing<PendingShiftSource> {
        let pager = self.ctx.db.shifts().pending_after(self.ctx.page_size, cursor);
        Listing::new(pager, self.ctx.policy, "list_pending_shifts")
    }

    /// Deposits a CLOSED shift's declared cash into `account_id` and marks
    /// the shift SETTLED.
    ///
    /// Retrying after a timeout is safe: the second attempt finds the shift
    /// SETTLED (or trips the one-deposit-per-shift index) and fails with
    /// `AlreadySettled` without a second movement.
    pub async fn deposit_shift(
        &self,
        shift_id: &str,
        account_id: &str,
    ) -> EngineResult<BankMovement> {
        settle(&self.ctx, shift_id, account_id).await
    }

    /// Posts money received from a customer.
    pub async fn post_customer_receipt(
        &self,
        customer_id: &str,
        account_id: &str,
        amount: Money,
        kind: ReceiptKind,
    ) -> EngineResult<BankMovement> {
        validate_positive_amount("amount", amount)?;

        let ctx = &self.ctx;
        let movement_id = Uuid::new_v4().to_string();
        let movement_id = movement_id.as_str();
        let movement = ctx
            .policy
            .run_tx("post_customer_receipt", move || async move {
                let mut tx = ctx.db.begin().await?;
                let now = ctx.clock.now();

                if let Some(posted) =
                    BankRepository::get_movement_in(&mut tx, movement_id).await?
                {
                    return Ok((tx, posted));
                }

                let customer = CustomerRepository::get_in(&mut tx, customer_id)
                    .await?
                    .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;
                require_account(&mut tx, account_id).await?;

                match kind {
                    ReceiptKind::Advance => {
                        CustomerRepository::credit_advance(&mut tx, customer_id, amount, now)
                            .await?;
                    }
                    ReceiptKind::CreditPayment => {
                        if !CustomerRepository::restore_credit(&mut tx, customer_id, amount, now)
                            .await?
                        {
                            return Err(ValidationError::OutOfRange {
                                field: "amount".to_string(),
                                min: 1,
                                max: customer.credit_used().cents(),
                            }
                            .into());
                        }
                    }
                }

                let movement = BankMovement {
                    id: movement_id.to_string(),
                    ..new_movement(
                        account_id,
                        MovementKind::Ingreso,
                        amount,
                        format!("Customer receipt {}", customer.name),
                        MovementOrigin::CustomerReceipt,
                        Some(customer_id.to_string()),
                        now,
                    )
                };
                post_in(&mut tx, &movement, now).await?;

                Ok::<_, EngineError>((tx, movement))
            })
            .await?;

        info!(
            customer_id,
            account_id,
            amount = %amount,
            ?kind,
            movement_id = %movement.id,
            "Customer receipt posted"
        );
        Ok(movement)
    }

    /// Posts a payment to a supplier. The balance may go negative.
    pub async fn record_egress(
        &self,
        account_id: &str,
        amount: Money,
        concept: &str,
    ) -> EngineResult<BankMovement> {
        validate_positive_amount("amount", amount)?;
        validate_text("concept", concept, MAX_CONCEPT_LEN)?;

        let ctx = &self.ctx;
        let movement_id = Uuid::new_v4().to_string();
        let movement_id = movement_id.as_str();
        let movement = ctx
            .policy
            .run_tx("record_egress", move || async move {
                let mut tx = ctx.db.begin().await?;
                let now = ctx.clock.now();

                if let Some(posted) =
                    BankRepository::get_movement_in(&mut tx, movement_id).await?
                {
                    return Ok((tx, posted));
                }

                require_account(&mut tx, account_id).await?;

                let movement = BankMovement {
                    id: movement_id.to_string(),
                    ..new_movement(
                        account_id,
                        MovementKind::Egreso,
                        amount,
                        concept.trim().to_string(),
                        MovementOrigin::Payable,
                        None,
                        now,
                    )
                };
                post_in(&mut tx, &movement, now).await?;

                Ok::<_, EngineError>((tx, movement))
            })
            .await?;

        info!(account_id, amount = %amount, movement_id = %movement.id, "Egress recorded");
        Ok(movement)
    }

    pub async fn account(&self, account_id: &str) -> EngineResult<BankAccount> {
        let ctx = &self.ctx;
        let account = ctx
            .policy
            .run("get_account", move || async move {
                Ok::<_, EngineError>(ctx.db.bank().get_account(account_id).await?)
            })
            .await?;

        account.ok_or_else(|| CoreError::AccountNotFound(account_id.to_string()).into())
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// Settle + deposit as one bounded, retried transaction.
pub(crate) async fn settle(
    ctx: &EngineContext,
    shift_id: &str,
    account_id: &str,
) -> EngineResult<BankMovement> {
    let movement = ctx
        .policy
        .run_tx("settle_shift", move || async move {
            let mut tx = ctx.db.begin().await?;
            let movement = settle_in(&mut tx, shift_id, account_id, ctx.clock.now()).await?;
            Ok::<_, EngineError>((tx, movement))
        })
        .await?;

    info!(
        shift_id,
        account_id,
        amount = %movement.amount,
        movement_id = %movement.id,
        "Shift settled"
    );
    Ok(movement)
}

/// Transition CLOSED → SETTLED, write the deposit and raise the balance.
async fn settle_in(
    conn: &mut SqliteConnection,
    shift_id: &str,
    account_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<BankMovement> {
    let mut shift = ShiftRepository::get_in(&mut *conn, shift_id)
        .await?
        .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()))?;
    require_account(&mut *conn, account_id).await?;

    shift.mark_settled(now)?;

    let already_settled = || -> EngineError {
        CoreError::AlreadySettled {
            shift_id: shift_id.to_string(),
        }
        .into()
    };

    if !ShiftRepository::mark_settled(&mut *conn, shift_id, now).await? {
        return Err(already_settled());
    }

    let movement = new_movement(
        account_id,
        MovementKind::Ingreso,
        shift.deposit_amount(),
        format!("Shift deposit {}", shift.id),
        MovementOrigin::ShiftDeposit,
        Some(shift.id.clone()),
        now,
    );

    match BankRepository::insert_movement(&mut *conn, &movement).await {
        Ok(()) => {}
        Err(err) if err.is_unique_violation_on("origin_ref") => return Err(already_settled()),
        Err(err) => return Err(err.into()),
    }
    BankRepository::adjust_balance(conn, account_id, movement.amount, now).await?;

    Ok(movement)
}

// =============================================================================
// Helpers
// =============================================================================

async fn require_account(conn: &mut SqliteConnection, account_id: &str) -> EngineResult<()> {
    match BankRepository::get_account_in(conn, account_id).await? {
        Some(_) => Ok(()),
        None => Err(CoreError::AccountNotFound(account_id.to_string()).into()),
    }
}

/// Inserts the movement and applies its signed amount to the balance.
async fn post_in(
    conn: &mut SqliteConnection,
    movement: &BankMovement,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    BankRepository::insert_movement(&mut *conn, movement).await?;
    BankRepository::adjust_balance(conn, &movement.account_id, movement.signed_amount(), now)
        .await?;
    Ok(())
}

fn new_movement(
    account_id: &str,
    kind: MovementKind,
    amount: Money,
    concept: String,
    origin: MovementOrigin,
    origin_ref: Option<String>,
    now: DateTime<Utc>,
) -> BankMovement {
    BankMovement {
        id: Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        kind,
        amount,
        concept,
        origin,
        origin_ref,
        conciliated: false,
        created_at: now,
        conciliated_at: None,
    }
}
