//! # Domain Types
//!
//! Records shared by the cart, the engines and the database layer.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────┐    ┌──────────────┐    ┌──────────────┐                  │
//! │  │   Till   │◄───│    Shift     │◄───│     Sale     │                  │
//! │  │  id      │    │  status      │    │  lines       │                  │
//! │  │  name    │    │  float       │    │  tenders     │                  │
//! │  └──────────┘    │  expected    │    │  total       │                  │
//! │                  │  declared    │    └──────┬───────┘                  │
//! │                  └──────┬───────┘           │                          │
//! │                         │ settle            │ CREDIT / ADVANCE         │
//! │                         ▼                   ▼                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────┐              │
//! │  │ BankAccount  │◄─│ BankMovement │  │ CustomerAccount │              │
//! │  │  balance     │  │  conciliated │  │  advance/credit │              │
//! │  └──────────────┘  └──────────────┘  └─────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Entities carry a UUID `id` for relations plus a business key where one
//! exists (product `sku`, sale `folio`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1600 bps = 16%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Mexican IVA, the default for every till.
    pub const IVA: TaxRate = TaxRate(1600);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::IVA
    }
}

// =============================================================================
// Till
// =============================================================================

/// A physical cash register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Till {
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// Catalog entry as returned by product lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    /// Stock Keeping Unit - business identifier.
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub unit_price: Money,
    /// Whether `unit_price` already includes tax.
    pub tax_inclusive: bool,
    /// Live stock level at lookup time.
    pub stock: Quantity,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer Account
// =============================================================================

/// Running balances for one customer.
///
/// - `advance_balance`: money the customer prepaid, usable as ADVANCE tender
/// - `credit_available`: remaining debt capacity, usable as CREDIT tender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CustomerAccount {
    pub id: String,
    pub name: String,
    pub advance_balance: Money,
    pub credit_limit: Money,
    pub credit_available: Money,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CustomerAccount {
    /// Outstanding debt (limit minus what is still available).
    pub fn credit_used(&self) -> Money {
        self.credit_limit - self.credit_available
    }
}

// =============================================================================
// Shift
// =============================================================================

/// Lifecycle state of a shift. `NONE` is the absence of a row.
///
/// ```text
///   open()        close()        settle()
/// ────────► ACTIVE ───────► CLOSED ───────► SETTLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftStatus {
    Active,
    Closed,
    Settled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Active => "active",
            ShiftStatus::Closed => "closed",
            ShiftStatus::Settled => "settled",
        }
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cashier's accountable cash session on a till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub till_id: String,
    pub cashier_id: String,
    pub status: ShiftStatus,
    /// Cash placed in the drawer at open.
    pub opening_float: Money,
    /// Running sum of cash tenders of committed sales (net of reversals).
    pub expected_cash: Money,
    /// Counted cash declared at close.
    pub declared_cash: Option<Money>,
    /// declared − (opening float + expected cash), set at close.
    pub variance: Option<Money>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Shift {
    /// Cash the drawer should hold: opening float plus cash sales.
    pub fn expected_drawer(&self) -> Money {
        self.opening_float + self.expected_cash
    }
}

/// A closed shift waiting for its cash to be deposited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PendingShift {
    pub shift_id: String,
    pub till_id: String,
    pub cashier_id: String,
    pub declared_cash: Money,
    pub expected_drawer: Money,
    pub variance: Money,
    #[ts(as = "String")]
    pub closed_at: DateTime<Utc>,
}

/// Per-shift totals (X report).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftSummary {
    pub shift_id: String,
    pub status: ShiftStatus,
    pub opening_float: Money,
    pub expected_cash: Money,
    pub sale_count: i64,
    pub reversed_count: i64,
    /// Tender totals of non-reversed sales, one entry per method used.
    pub tender_totals: Vec<Tender>,
}

// =============================================================================
// Tender
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TenderMethod {
    /// Physical cash; feeds the shift's expected cash.
    Cash,
    /// Bank transfer or card settled outside the drawer.
    Transfer,
    /// Charged to the customer's credit line.
    Credit,
    /// Paid from the customer's prepaid advance balance.
    Advance,
}

impl TenderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenderMethod::Cash => "CASH",
            TenderMethod::Transfer => "TRANSFER",
            TenderMethod::Credit => "CREDIT",
            TenderMethod::Advance => "ADVANCE",
        }
    }

    /// Whether this method draws on a customer account.
    pub fn needs_customer(&self) -> bool {
        matches!(self, TenderMethod::Credit | TenderMethod::Advance)
    }
}

impl fmt::Display for TenderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment entry `{method, amount}` applied to a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Tender {
    pub method: TenderMethod,
    pub amount: Money,
}

impl Tender {
    pub fn new(method: TenderMethod, amount: Money) -> Self {
        Tender { method, amount }
    }

    pub fn cash(amount: Money) -> Self {
        Tender::new(TenderMethod::Cash, amount)
    }
}

/// Sum of the entries paid with `method`.
pub fn tendered_by(tenders: &[Tender], method: TenderMethod) -> Money {
    tenders
        .iter()
        .filter(|t| t.method == method)
        .map(|t| t.amount)
        .sum()
}

// =============================================================================
// Sale
// =============================================================================

/// A committed, immutable sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-readable receipt number.
    pub folio: String,
    pub shift_id: String,
    pub customer_id: Option<String>,
    pub lines: Vec<SaleLine>,
    pub tenders: Vec<Tender>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub fn cash_portion(&self) -> Money {
        tendered_by(&self.tenders, TenderMethod::Cash)
    }
}

/// A line item frozen at commit time, independent of later catalog edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: Quantity,
    /// Rounded for display; the sale total is rounded once over all lines.
    pub line_total: Money,
}

/// Compensating record for a fully reversed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleReversal {
    pub id: String,
    pub sale_id: String,
    pub reason: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Treasury
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BankAccount {
    pub id: String,
    pub name: String,
    pub bank: String,
    pub balance: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    /// Money into the account.
    Ingreso,
    /// Money out of the account.
    Egreso,
}

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementOrigin {
    ShiftDeposit,
    CustomerReceipt,
    Payable,
}

/// A ledger entry on a bank account. Only `conciliated` ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BankMovement {
    pub id: String,
    pub account_id: String,
    pub kind: MovementKind,
    pub amount: Money,
    pub concept: String,
    pub origin: MovementOrigin,
    /// Shift id for deposits, customer id for receipts.
    pub origin_ref: Option<String>,
    pub conciliated: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub conciliated_at: Option<DateTime<Utc>>,
}

impl BankMovement {
    /// Effect on the account balance (negative for egresses).
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            MovementKind::Ingreso => self.amount,
            MovementKind::Egreso => -self.amount,
        }
    }
}

/// How a customer receipt is applied to the customer's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptKind {
    /// Prepayment, added to the advance balance.
    Advance,
    /// Payment against debt, restores available credit.
    CreditPayment,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_default_is_iva() {
        assert_eq!(TaxRate::default().bps(), 1600);
        assert!((TaxRate::IVA.percentage() - 16.0).abs() < 0.001);
    }

    #[test]
    fn test_tender_method_wire_names() {
        let json = serde_json::to_string(&Tender::cash(Money::from_cents(100))).unwrap();
        assert_eq!(json, r#"{"method":"CASH","amount":100}"#);
        assert!(TenderMethod::Credit.needs_customer());
        assert!(!TenderMethod::Transfer.needs_customer());
    }

    #[test]
    fn test_shift_status_wire_names() {
        let json = serde_json::to_string(&ShiftStatus::Active).unwrap();
        assert_eq!(json, r#""ACTIVE""#);
        let settled: ShiftStatus = serde_json::from_str(r#""SETTLED""#).unwrap();
        assert_eq!(settled, ShiftStatus::Settled);
        assert_eq!(ShiftStatus::Closed.as_str(), "closed");
    }

    #[test]
    fn test_tendered_by() {
        let tenders = [
            Tender::cash(Money::from_cents(7000)),
            Tender::new(TenderMethod::Transfer, Money::from_cents(4600)),
        ];
        assert_eq!(tendered_by(&tenders, TenderMethod::Cash).cents(), 7000);
        assert_eq!(tendered_by(&tenders, TenderMethod::Credit).cents(), 0);
    }

    #[test]
    fn test_signed_amount() {
        let mut movement = BankMovement {
            id: "m-1".into(),
            account_id: "a-1".into(),
            kind: MovementKind::Egreso,
            amount: Money::from_cents(500),
            concept: "rent".into(),
            origin: MovementOrigin::Payable,
            origin_ref: None,
            conciliated: false,
            created_at: Utc::now(),
            conciliated_at: None,
        };
        assert_eq!(movement.signed_amount().cents(), -500);
        movement.kind = MovementKind::Ingreso;
        assert_eq!(movement.signed_amount().cents(), 500);
    }
}
