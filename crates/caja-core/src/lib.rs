//! # caja-core: Pure Business Logic for the Cash Session Core
//!
//! Money math, the cart, tender rules and shift transitions as pure
//! functions. Nothing in this crate performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cash Session & Settlement                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                caja-engine (transactions)                       │   │
//! │  │   shifts • sale commit • treasury • reconciliation              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ caja-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │  cart   │ │ tender  │ │  shift  │ │  types  │  │   │
//! │  │   │ Money   │ │ Cart    │ │ rules   │ │ guards  │ │ records │  │   │
//! │  │   │ TaxSplit│ │ CartLine│ │ plan    │ │         │ │         │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  caja-db (SQLite repositories)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Integer Money**: minor units in i64, sub-cent intermediates in i128,
//!    rounded once with Bankers Rounding
//! 2. **Exact tender equality**: Σ tenders == total compares integers
//! 3. **Explicit Errors**: typed `CoreError` variants with context
//!
//! ## Example Usage
//!
//! ```rust
//! use caja_core::{Cart, Money, Quantity, TaxRate};
//! use caja_core::tender::validate_tenders;
//! use caja_core::types::Tender;
//!
//! let cart = Cart::new(TaxRate::IVA);
//! assert!(cart.is_empty());
//!
//! let total = Money::from_cents(11600);
//! let plan = validate_tenders(total, &[Tender::cash(total)], None).unwrap();
//! assert_eq!(plan.cash, total);
//! # let _ = Quantity::ONE;
//! ```

pub mod cart;
pub mod clock;
pub mod error;
pub mod money;
pub mod quantity;
pub mod shift;
pub mod tender;
pub mod types;
pub mod validation;

pub use cart::{Cart, CartLine, CartTotals, LineId};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, CoreResult, TenderIssue, ValidationError};
pub use money::{Money, TaxSplit};
pub use quantity::Quantity;
pub use tender::TenderPlan;
pub use types::*;

/// Maximum lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// A sale is paid with one tender or split across two.
pub const MAX_TENDER_ENTRIES: usize = 2;
