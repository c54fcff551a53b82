//! # Tender Validation
//!
//! Checks a list of `{method, amount}` entries against a cart total and,
//! where needed, against a customer's live account.
//!
//! ## Rule Order
//! ```text
//! 1. 1..=2 entries, no repeated method, every amount > 0
//! 2. CREDIT / ADVANCE present → customer must be given   (CustomerRequired)
//! 3. Σ amounts == total, exact minor-unit equality        (InvalidTender)
//! 4. CREDIT ≤ credit_available, ADVANCE ≤ advance_balance (InvalidTender)
//! ```
//!
//! Steps 1-3 are pure and run before any transaction. Step 4 needs the
//! account as it is *inside* the commit transaction, so it is a separate
//! call made with the freshly read row.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, TenderIssue};
use crate::money::Money;
use crate::types::{tendered_by, CustomerAccount, Tender, TenderMethod};
use crate::MAX_TENDER_ENTRIES;

/// Per-method breakdown of a validated tender list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenderPlan {
    pub cash: Money,
    pub transfer: Money,
    pub credit: Money,
    pub advance: Money,
}

impl TenderPlan {
    fn from_tenders(tenders: &[Tender]) -> Self {
        TenderPlan {
            cash: tendered_by(tenders, TenderMethod::Cash),
            transfer: tendered_by(tenders, TenderMethod::Transfer),
            credit: tendered_by(tenders, TenderMethod::Credit),
            advance: tendered_by(tenders, TenderMethod::Advance),
        }
    }

    pub fn total(&self) -> Money {
        self.cash + self.transfer + self.credit + self.advance
    }

    /// Whether the plan touches a customer account at all.
    pub fn draws_on_account(&self) -> bool {
        self.credit.is_positive() || self.advance.is_positive()
    }
}

/// Validates the shape of a tender list against the sale total.
///
/// ## Example
/// ```rust
/// use caja_core::money::Money;
/// use caja_core::tender::validate_tenders;
/// use caja_core::types::{Tender, TenderMethod};
///
/// let total = Money::from_cents(11600);
/// let split = [
///     Tender::cash(Money::from_cents(7000)),
///     Tender::new(TenderMethod::Transfer, Money::from_cents(4600)),
/// ];
/// assert!(validate_tenders(total, &split, None).is_ok());
///
/// let short = [
///     Tender::cash(Money::from_cents(7000)),
///     Tender::new(TenderMethod::Transfer, Money::from_cents(4000)),
/// ];
/// assert!(validate_tenders(total, &short, None).is_err());
/// ```
pub fn validate_tenders(
    total: Money,
    tenders: &[Tender],
    customer_id: Option<&str>,
) -> CoreResult<TenderPlan> {
    if tenders.is_empty() {
        return Err(CoreError::InvalidTender(TenderIssue::Empty));
    }

    if tenders.len() > MAX_TENDER_ENTRIES {
        return Err(CoreError::InvalidTender(TenderIssue::TooManyEntries {
            count: tenders.len(),
            max: MAX_TENDER_ENTRIES,
        }));
    }

    for (i, tender) in tenders.iter().enumerate() {
        if tenders[..i].iter().any(|t| t.method == tender.method) {
            return Err(CoreError::InvalidTender(TenderIssue::DuplicateMethod {
                method: tender.method,
            }));
        }
        if !tender.amount.is_positive() {
            return Err(CoreError::InvalidTender(TenderIssue::NonPositiveAmount {
                method: tender.method,
                amount: tender.amount,
            }));
        }
    }

    let has_customer = customer_id.is_some_and(|id| !id.trim().is_empty());
    if let Some(tender) = tenders.iter().find(|t| t.method.needs_customer()) {
        if !has_customer {
            return Err(CoreError::CustomerRequired {
                method: tender.method,
            });
        }
    }

    let plan = TenderPlan::from_tenders(tenders);
    let tendered = plan.total();
    if tendered != total {
        return Err(CoreError::InvalidTender(TenderIssue::SumMismatch {
            total,
            tendered,
            shortfall: total - tendered,
        }));
    }

    Ok(plan)
}

/// Checks CREDIT and ADVANCE portions against the customer's balances.
///
/// Call with the account row read inside the commit transaction.
pub fn check_account_limits(plan: &TenderPlan, account: &CustomerAccount) -> CoreResult<()> {
    if plan.credit > account.credit_available {
        return Err(CoreError::InvalidTender(TenderIssue::CreditExceeded {
            available: account.credit_available,
            requested: plan.credit,
        }));
    }

    if plan.advance > account.advance_balance {
        return Err(CoreError::InvalidTender(TenderIssue::AdvanceExceeded {
            available: account.advance_balance,
            requested: plan.advance,
        }));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
