//! # Cart Engine
//!
//! The in-progress sale: an owned value, local to one till, never shared.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation            Check                       Effect                │
//! │  ─────────            ─────                       ──────                │
//! │  add_item()           stock ≤ 0 → OutOfStock      merge into line or    │
//! │                       in cart + req > stock       push a new line       │
//! │                         → StockExceeded                                 │
//! │                                                                         │
//! │  adjust_quantity()    result > snapshot           clamp at 0.100        │
//! │                         → StockExceeded                                 │
//! │                                                                         │
//! │  remove_line()        unknown id → LineNotFound   line dropped          │
//! │                                                                         │
//! │  total()/tax_portion()                            computed, not stored  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is NOT reserved here. The snapshot only gives early feedback; the
//! sale commit re-checks live stock inside its transaction.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, TaxSplit};
use crate::quantity::{Quantity, QUANTITY_SCALE};
use crate::types::{Product, TaxRate};
use crate::MAX_CART_LINES;

/// Identifier of a line inside one cart.
pub type LineId = u32;

/// A line in the cart.
///
/// Product data is frozen when the line is created so the cart displays
/// consistent data even if the catalog changes before commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub line_id: LineId,
    pub product_id: String,
    pub sku: String,
    pub name: String,
    /// Tax-inclusive unit price.
    pub unit_price: Money,
    pub quantity: Quantity,
    /// Stock seen at the last lookup of this product.
    pub available_stock: Quantity,
}

impl CartLine {
    /// Line total rounded to cents (display only).
    pub fn line_total(&self) -> Money {
        self.quantity.price(self.unit_price)
    }
}

/// Cart totals summary for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub line_count: usize,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

/// The working set of one in-progress sale.
///
/// ## Invariants
/// - Lines are unique by `product_id`
/// - Every line quantity is ≥ 0.100 and ≤ its stock snapshot
/// - At most `MAX_CART_LINES` lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    tax_rate: TaxRate,
    lines: Vec<CartLine>,
    next_line_id: LineId,
}

impl Cart {
    pub fn new(tax_rate: TaxRate) -> Self {
        Cart {
            tax_rate,
            lines: Vec::new(),
            next_line_id: 1,
        }
    }

    /// Adds a product, merging into its existing line if present.
    ///
    /// ## Returns
    /// - `Ok(line_id)` of the line that now holds the product
    /// - `Err(OutOfStock)` when the product has no stock
    /// - `Err(StockExceeded)` when in-cart + requested would pass the stock;
    ///   `available` is the cap and nothing is added
    pub fn add_item(&mut self, product: &Product, requested: Quantity) -> CoreResult<LineId> {
        if !requested.is_positive() {
            return Err(ValidationError::must_be_positive("quantity").into());
        }

        if !product.stock.is_positive() {
            return Err(CoreError::OutOfStock {
                product_id: product.id.clone(),
            });
        }

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let wanted = line.quantity + requested;
            if wanted > product.stock {
                return Err(CoreError::StockExceeded {
                    product_id: product.id.clone(),
                    available: product.stock,
                    requested: wanted,
                });
            }
            line.quantity = wanted;
            line.available_stock = product.stock;
            return Ok(line.line_id);
        }

        if requested > product.stock {
            return Err(CoreError::StockExceeded {
                product_id: product.id.clone(),
                available: product.stock,
                requested,
            });
        }

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            });
        }

        let unit_price = if product.tax_inclusive {
            product.unit_price
        } else {
            product.unit_price.with_tax(self.tax_rate)
        };

        let line_id = self.next_line_id;
        self.next_line_id += 1;
        self.lines.push(CartLine {
            line_id,
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price,
            quantity: requested,
            available_stock: product.stock,
        });

        Ok(line_id)
    }

    /// Changes a line's quantity by `delta` (milli-units, may be negative).
    ///
    /// The result never drops below 0.100; removing a line is an explicit
    /// `remove_line`. Growing past the stock snapshot fails with
    /// `StockExceeded` and leaves the line untouched.
    pub fn adjust_quantity(&mut self, line_id: LineId, delta: Quantity) -> CoreResult<Quantity> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_id == line_id)
            .ok_or(CoreError::LineNotFound(line_id))?;

        let wanted = line.quantity + delta;
        if wanted > line.available_stock {
            return Err(CoreError::StockExceeded {
                product_id: line.product_id.clone(),
                available: line.available_stock,
                requested: wanted,
            });
        }

        line.quantity = wanted.max(Quantity::MIN_ADJUSTED);
        Ok(line.quantity)
    }

    pub fn remove_line(&mut self, line_id: LineId) -> CoreResult<CartLine> {
        let index = self
            .lines
            .iter()
            .position(|l| l.line_id == line_id)
            .ok_or(CoreError::LineNotFound(line_id))?;
        Ok(self.lines.remove(index))
    }

    /// Grand total: Σ unit price × quantity, rounded once.
    pub fn total(&self) -> Money {
        let exact: i128 = self
            .lines
            .iter()
            .map(|l| l.quantity.extend_price(l.unit_price))
            .sum();
        Money::from_scaled(exact, QUANTITY_SCALE as i128)
    }

    /// Tax contained in the (tax-inclusive) total.
    pub fn tax_portion(&self) -> Money {
        self.tax_split().tax
    }

    pub fn tax_split(&self) -> TaxSplit {
        self.total().extract_tax(self.tax_rate)
    }

    pub fn totals(&self) -> CartTotals {
        let split = self.tax_split();
        CartTotals {
            line_count: self.lines.len(),
            subtotal: split.subtotal,
            tax: split.tax,
            total: split.subtotal + split.tax,
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, line_id: LineId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for Cart {
    fn default() -> Self {
        Cart::new(TaxRate::default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
