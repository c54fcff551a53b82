//! # Reconciliation Engine
//!
//! Manual confirmation that a ledger movement matches a line on the bank
//! statement. Matching itself is done by a person; the engine only lists
//! what is still open and flips the flag once.

use std::sync::Arc;

use caja_core::{BankMovement, CoreError};
use caja_db::{BankRepository, PageCursor, UnconciliatedSource};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::listing::Listing;
use crate::EngineContext;

#[derive(Clone)]
pub struct ReconciliationEngine {
    ctx: Arc<EngineContext>,
}

impl ReconciliationEngine {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        ReconciliationEngine { ctx }
    }

    /// Unconciliated movements, oldest first, optionally for one account.
    pub fn list_unconciliated(&self, account_id: Option<&str>) -> Listing<UnconciliatedSource> {
        let pager = self.ctx.db.bank().unconciliated(account_id, self.ctx.page_size);
        Listing::new(pager, self.ctx.policy, "list_unconciliated")
    }

    pub fn list_unconciliated_after(
        &self,
        account_id: Option<&str>,
        cursor: PageCursor,
    ) -> Listing<UnconciliatedSource> {
        let pager = self
            .ctx
            .db
            .bank()
            .unconciliated_after(account_id, self.ctx.page_size, cursor);
        Listing::new(pager, self.ctx.policy, "list_unconciliated")
    }

    /// Marks a movement as matched to the bank statement.
    ///
    /// Fails with `MovementNotFound` or `AlreadyConciliated`; returns the
    /// updated movement.
    pub async fn conciliate(&self, movement_id: &str) -> EngineResult<BankMovement> {
        let ctx = &self.ctx;
        let movement = ctx
            .policy
            .run_tx("conciliate", move || async move {
                let mut tx = ctx.db.begin().await?;
                let now = ctx.clock.now();

                let movement = BankRepository::get_movement_in(&mut tx, movement_id)
                    .await?
                    .ok_or_else(|| CoreError::MovementNotFound(movement_id.to_string()))?;

                let already = CoreError::AlreadyConciliated {
                    movement_id: movement.id.clone(),
                };
                if movement.conciliated
                    || !BankRepository::mark_conciliated(&mut tx, movement_id, now).await?
                {
                    return Err(already.into());
                }

                let updated = BankRepository::get_movement_in(&mut tx, movement_id)
                    .await?
                    .ok_or_else(|| CoreError::MovementNotFound(movement_id.to_string()))?;

                Ok::<_, EngineError>((tx, updated))
            })
            .await?;

        info!(
            movement_id,
            account_id = %movement.account_id,
            amount = %movement.amount,
            "Movement conciliated"
        );
        Ok(movement)
    }
}
