//! # caja-engine: Transactional Engines for the Cash Session Core
//!
//! Every operation that mutates shared state (stock, customer balances,
//! shift counters, the bank ledger) is one bounded SQLite transaction,
//! retried on infrastructure failure.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Engine                                       │
//! │                                                                         │
//! │  ┌────────────────┐ ┌────────────────┐ ┌──────────────┐ ┌────────────┐ │
//! │  │  ShiftEngine   │ │ CheckoutEngine │ │TreasuryEngine│ │Reconcilia- │ │
//! │  │                │ │                │ │              │ │tionEngine  │ │
//! │  │ open / close   │ │ cart helpers   │ │ pending list │ │ unconcil.  │ │
//! │  │ settle         │ │ commit (a..g)  │ │ deposit      │ │ list       │ │
//! │  │ record cash    │ │ reverse        │ │ receipts     │ │ conciliate │ │
//! │  │ summary        │ │                │ │ egress       │ │            │ │
//! │  └───────┬────────┘ └───────┬────────┘ └──────┬───────┘ └─────┬──────┘ │
//! │          └──────────────────┴─────────┬───────┴───────────────┘        │
//! │                                       ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ EngineContext: Database • Clock • RetryPolicy • TaxRate          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  RetryPolicy::run  → timeout per attempt, backoff between attempts      │
//! │  Listing           → keyset pager with the same bounds                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`shift`] - Shift State Machine
//! - [`checkout`] - Sale Commit Protocol and reversals
//! - [`treasury`] - Settlement, receipts, egresses
//! - [`reconciliation`] - Manual movement conciliation
//! - [`config`] - TOML configuration with `CAJA_*` overrides
//! - [`retry`] - Timeout and backoff policy
//! - [`listing`] - Lazy, restartable listings
//! - [`telemetry`] - Tracing subscriber setup

pub mod checkout;
pub mod config;
pub mod error;
pub mod listing;
pub mod reconciliation;
pub mod retry;
pub mod shift;
pub mod telemetry;
pub mod treasury;

use std::sync::Arc;

use caja_core::{Clock, SystemClock, TaxRate};
use caja_db::Database;
use tracing::info;

pub use checkout::CheckoutEngine;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use listing::Listing;
pub use reconciliation::ReconciliationEngine;
pub use retry::RetryPolicy;
pub use shift::ShiftEngine;
pub use treasury::TreasuryEngine;

/// Shared state behind every engine.
pub(crate) struct EngineContext {
    pub db: Database,
    pub clock: Arc<dyn Clock>,
    pub policy: RetryPolicy,
    pub tax_rate: TaxRate,
    pub page_size: u32,
}

/// Entry point; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    /// Opens (and migrates) the configured database.
    pub async fn open(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database_path().display(), "Engine database opened");

        Self::with_database(db, config, Arc::new(SystemClock))
    }

    /// Builds an engine over an existing database and clock.
    pub fn with_database(
        db: Database,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;

        Ok(Engine {
            ctx: Arc::new(EngineContext {
                db,
                clock,
                policy: config.retry_policy(),
                tax_rate: config.tax_rate(),
                page_size: config.listing.page_size,
            }),
        })
    }

    pub fn shifts(&self) -> ShiftEngine {
        ShiftEngine::new(self.ctx.clone())
    }

    pub fn checkout(&self) -> CheckoutEngine {
        CheckoutEngine::new(self.ctx.clone())
    }

    pub fn treasury(&self) -> TreasuryEngine {
        TreasuryEngine::new(self.ctx.clone())
    }

    pub fn reconciliation(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(self.ctx.clone())
    }

    /// Underlying database, for catalog maintenance and reporting reads.
    pub fn db(&self) -> &Database {
        &self.ctx.db
    }
}
