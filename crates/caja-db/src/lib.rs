//! # caja-db: Database Layer
//!
//! SQLite storage for the cash session core.
//!
//! ## Module Structure
//! ```text
//! caja-db/
//! ├── pool.rs          ← Pool setup, transactions, repository accessors
//! ├── migrations.rs    ← Embedded schema migrations
//! ├── pager.rs         ← Keyset cursors for long listings
//! ├── error.rs         ← DbError with retry classification
//! └── repository/
//!     ├── till.rs      ← Registers
//!     ├── product.rs   ← Lookup and guarded stock updates
//!     ├── customer.rs  ← Advance and credit balances
//!     ├── shift.rs     ← Shift lifecycle, X report, pending listing
//!     ├── sale.rs      ← Sales, lines, tenders, reversals
//!     └── bank.rs      ← Accounts, ledger, unconciliated listing
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use caja_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("caja.db")).await?;
//!
//! let product = db.products().lookup("7501000000017").await?;
//!
//! let mut tx = db.begin().await?;
//! let ok = ProductRepository::decrement_stock(&mut tx, &id, qty, now).await?;
//! tx.commit().await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pager;
pub mod pool;
pub mod repository;

#[cfg(test)]
mod test_support;

pub use error::{DbError, DbResult};
pub use pager::{PageCursor, PageSource, Pager};
pub use pool::{Database, DbConfig};
pub use repository::bank::{BankRepository, UnconciliatedSource};
pub use repository::customer::CustomerRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::shift::{PendingShiftSource, ShiftRepository};
pub use repository::till::TillRepository;
