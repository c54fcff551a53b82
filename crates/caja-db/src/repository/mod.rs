//! # Repository Module
//!
//! One repository per aggregate. Each owns a pool handle for standalone
//! reads and exposes associated functions over `&mut SqliteConnection` for
//! the steps that must run inside a caller's transaction.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Read path (no transaction)                                            │
//! │       db.products().lookup("7501000000017")                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ProductRepository { pool }                                            │
//! │                                                                         │
//! │  Write path (inside the engine's transaction)                          │
//! │       let mut tx = db.begin().await?;                                   │
//! │       ProductRepository::decrement_stock(&mut tx, id, qty, now)         │
//! │       ShiftRepository::add_expected_cash(&mut tx, shift_id, cash)       │
//! │       tx.commit().await?;                                               │
//! │                                                                         │
//! │  Guarded updates return `bool`: false means the guard (stock ≥ qty,    │
//! │  status = 'closed', ...) did not hold and nothing was written.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`till::TillRepository`] - Registers
//! - [`product::ProductRepository`] - Catalog lookup and stock
//! - [`customer::CustomerRepository`] - Advance and credit balances
//! - [`shift::ShiftRepository`] - Shift lifecycle and X report
//! - [`sale::SaleRepository`] - Committed sales and reversals
//! - [`bank::BankRepository`] - Bank accounts and the movement ledger

pub mod bank;
pub mod customer;
pub mod product;
pub mod sale;
pub mod shift;
pub mod till;
