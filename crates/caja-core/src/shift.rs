//! # Shift Transition Rules
//!
//! Pure guards for the shift lifecycle. The engine reads a shift inside a
//! transaction, asks these guards whether the transition is allowed, then
//! applies a status-guarded UPDATE so a concurrent transition cannot slip
//! in between.
//!
//! ```text
//!                 record_sale_cash (+)
//!                 ┌──────┐
//!                 ▼      │
//!   open() ──► ACTIVE ───┘
//!                 │ close(declared)          sales now → ShiftClosed
//!                 ▼
//!              CLOSED
//!                 │ settle(account)          ACTIVE  → ShiftNotClosed
//!                 ▼                          SETTLED → AlreadySettled
//!              SETTLED
//! ```

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Shift, ShiftStatus};

impl Shift {
    /// Builds a new ACTIVE shift. Uniqueness per till is enforced by storage.
    pub fn open(
        id: String,
        till_id: &str,
        cashier_id: &str,
        opening_float: Money,
        now: DateTime<Utc>,
    ) -> CoreResult<Shift> {
        if till_id.trim().is_empty() {
            return Err(ValidationError::required("till_id").into());
        }
        if cashier_id.trim().is_empty() {
            return Err(ValidationError::required("cashier_id").into());
        }
        if opening_float.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "opening_float".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        Ok(Shift {
            id,
            till_id: till_id.to_string(),
            cashier_id: cashier_id.to_string(),
            status: ShiftStatus::Active,
            opening_float,
            expected_cash: Money::zero(),
            declared_cash: None,
            variance: None,
            opened_at: now,
            closed_at: None,
            settled_at: None,
        })
    }

    /// Sales (and reversals) can only touch an ACTIVE shift.
    pub fn ensure_accepts_sales(&self) -> CoreResult<()> {
        match self.status {
            ShiftStatus::Active => Ok(()),
            ShiftStatus::Closed | ShiftStatus::Settled => Err(CoreError::ShiftClosed {
                shift_id: self.id.clone(),
            }),
        }
    }

    /// Closes the shift with the counted cash and returns the variance.
    pub fn close(&mut self, declared_cash: Money, now: DateTime<Utc>) -> CoreResult<Money> {
        if self.status != ShiftStatus::Active {
            return Err(CoreError::NoActiveShift {
                shift_id: self.id.clone(),
            });
        }
        if declared_cash.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "declared_cash".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let variance = declared_cash - self.expected_drawer();
        self.status = ShiftStatus::Closed;
        self.declared_cash = Some(declared_cash);
        self.variance = Some(variance);
        self.closed_at = Some(now);
        Ok(variance)
    }

    /// Only a CLOSED shift can be settled.
    pub fn ensure_settleable(&self) -> CoreResult<()> {
        match self.status {
            ShiftStatus::Closed => Ok(()),
            ShiftStatus::Settled => Err(CoreError::AlreadySettled {
                shift_id: self.id.clone(),
            }),
            ShiftStatus::Active => Err(CoreError::ShiftNotClosed {
                shift_id: self.id.clone(),
                status: self.status,
            }),
        }
    }

    /// Cash to deposit on settlement (the declared count).
    pub fn deposit_amount(&self) -> Money {
        self.declared_cash.unwrap_or_default()
    }

    pub fn mark_settled(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_settleable()?;
        self.status = ShiftStatus::Settled;
        self.settled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(float_cents: i64) -> Shift {
        Shift::open(
            "s-1".into(),
            "till-1",
            "cashier-1",
            Money::from_cents(float_cents),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_validates_input() {
        assert!(Shift::open("s".into(), "", "c", Money::zero(), Utc::now()).is_err());
        assert!(Shift::open("s".into(), "t", "c", Money::from_cents(-1), Utc::now()).is_err());
        let shift = active(50000);
        assert_eq!(shift.status, ShiftStatus::Active);
        assert_eq!(shift.expected_cash, Money::zero());
    }

    #[test]
    fn test_close_computes_variance_against_float_plus_cash() {
        let mut shift = active(50000);
        shift.expected_cash = Money::from_cents(11600);

        let variance = shift.close(Money::from_cents(61600), Utc::now()).unwrap();
        assert_eq!(variance, Money::zero());
        assert_eq!(shift.status, ShiftStatus::Closed);

        let mut short = active(50000);
        short.expected_cash = Money::from_cents(11600);
        let variance = short.close(Money::from_cents(61000), Utc::now()).unwrap();
        assert_eq!(variance.cents(), -600);
    }

    #[test]
    fn test_closed_shift_rejects_sales_and_second_close() {
        let mut shift = active(0);
        shift.close(Money::zero(), Utc::now()).unwrap();

        assert!(matches!(
            shift.ensure_accepts_sales(),
            Err(CoreError::ShiftClosed { .. })
        ));
        assert!(matches!(
            shift.close(Money::zero(), Utc::now()),
            Err(CoreError::NoActiveShift { .. })
        ));
    }

    #[test]
    fn test_settle_guards() {
        let mut shift = active(0);
        assert!(matches!(
            shift.ensure_settleable(),
            Err(CoreError::ShiftNotClosed { .. })
        ));

        shift.close(Money::from_cents(100), Utc::now()).unwrap();
        shift.mark_settled(Utc::now()).unwrap();
        assert_eq!(shift.status, ShiftStatus::Settled);
        assert!(matches!(
            shift.mark_settled(Utc::now()),
            Err(CoreError::AlreadySettled { .. })
        ));
    }
}
