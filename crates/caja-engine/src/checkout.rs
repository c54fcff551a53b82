//! # Sale Commit Protocol
//!
//! Turns an owned [`Cart`] plus tenders into an immutable [`Sale`].
//!
//! ## Commit Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  outside the transaction                                                │
//! │    cart non-empty, tender shape (sum, methods, customer present)        │
//! │                                                                         │
//! │  BEGIN ─────────────────────────────────────────────────────────────┐   │
//! │  │ shift is ACTIVE                                    → ShiftClosed │   │
//! │  │ (a) every line: live stock ≥ qty                  → StockChanged │   │
//! │  │ (b) live customer balances ≥ CREDIT / ADVANCE    → InvalidTender │   │
//! │  │ (c) stock -= qty            WHERE stock >= qty                   │   │
//! │  │ (d) credit/advance -= amt   WHERE balance >= amt                 │   │
//! │  │ (e) expected_cash += cash   WHERE status = 'active'              │   │
//! │  │ (f) INSERT sale, lines, tenders (folio per shift)                │   │
//! │  COMMIT ────────────────────────────────────────────────────────────┘   │
//! │  (g) cart.clear()                                                       │
//! │                                                                         │
//! │  Any failure drops the transaction: stock, balances and the shift      │
//! │  counter are untouched and the cart is kept for correction.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two cashiers selling the last unit race on step (c); SQLite lets one
//! writer through and the loser re-runs from (a), where it sees the new
//! stock and fails with `StockChanged`.
//!
//! The sale id is chosen once per `commit` call. Every attempt first looks
//! that id up, so a retry after a commit that did land returns the stored
//! sale instead of selling the cart again.

use std::sync::Arc;

use caja_core::tender::{check_account_limits, validate_tenders};
use caja_core::validation::validate_text;
use caja_core::{
    tendered_by, Cart, CoreError, CustomerAccount, LineId, Product, Quantity, Sale, SaleLine,
    SaleReversal, Tender, TenderIssue, TenderMethod, TenderPlan, ValidationError,
};
use caja_db::{CustomerRepository, ProductRepository, SaleRepository, ShiftRepository};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::retry::Tx;
use crate::shift::record_sale_cash_in;
use crate::EngineContext;

/// Longest accepted reversal reason.
const MAX_REASON_LEN: usize = 200;

#[derive(Clone)]
pub struct CheckoutEngine {
    ctx: Arc<EngineContext>,
}

impl CheckoutEngine {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        CheckoutEngine { ctx }
    }

    // =========================================================================
    // Catalog / cart helpers
    // =========================================================================

    /// An empty cart at the configured tax rate.
    pub fn new_cart(&self) -> Cart {
        Cart::new(self.ctx.tax_rate)
    }

    /// Resolves a product by id, SKU or barcode with its current stock.
    pub async fn lookup_product(&self, code: &str) -> EngineResult<Product> {
        let ctx = &self.ctx;
        let product = ctx
            .policy
            .run("lookup_product", move || async move {
                Ok::<_, EngineError>(ctx.db.products().lookup(code).await?)
            })
            .await?;

        product.ok_or_else(|| CoreError::ProductNotFound(code.to_string()).into())
    }

    pub async fn get_account(&self, customer_id: &str) -> EngineResult<CustomerAccount> {
        let ctx = &self.ctx;
        let account = ctx
            .policy
            .run("get_customer", move || async move {
                Ok::<_, EngineError>(ctx.db.customers().get_by_id(customer_id).await?)
            })
            .await?;

        account.ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()).into())
    }

    /// Looks up `code` and adds it to `cart` against the stock read now.
    pub async fn add_to_cart(
        &self,
        cart: &mut Cart,
        code: &str,
        quantity: Quantity,
    ) -> EngineResult<LineId> {
        let product = self.lookup_product(code).await?;
        Ok(cart.add_item(&product, quantity)?)
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commits `cart` against `shift_id`.
    ///
    /// On success the cart is cleared and the stored sale is returned. On
    /// any error nothing was written and the cart is left as it was.
    pub async fn commit(
        &self,
        shift_id: &str,
        cart: &mut Cart,
        tenders: &[Tender],
        customer_id: Option<&str>,
    ) -> EngineResult<Sale> {
        if cart.is_empty() {
            return Err(ValidationError::required("cart items").into());
        }

        let customer_id = customer_id.map(str::trim).filter(|id| !id.is_empty());
        let plan = validate_tenders(cart.total(), tenders, customer_id)?;

        let sale_id = Uuid::new_v4().to_string();
        let sale_id = sale_id.as_str();
        let snapshot: &Cart = cart;
        let sale = self
            .ctx
            .policy
            .run_tx("commit_sale", move || {
                self.commit_once(sale_id, shift_id, snapshot, tenders, customer_id, plan)
            })
            .await?;

        cart.clear();

        info!(
            sale_id = %sale.id,
            folio = %sale.folio,
            shift_id,
            total = %sale.total,
            cash = %plan.cash,
            lines = sale.lines.len(),
            "Sale committed"
        );
        Ok(sale)
    }

    async fn commit_once(
        &self,
        sale_id: &str,
        shift_id: &str,
        cart: &Cart,
        tenders: &[Tender],
        customer_id: Option<&str>,
        plan: TenderPlan,
    ) -> EngineResult<(Tx, Sale)> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.db.begin().await?;

        if let Some(stored) = SaleRepository::get_in(&mut tx, sale_id).await? {
            debug!(sale_id, "Sale already stored by an earlier attempt");
            return Ok((tx, stored));
        }

        let shift = ShiftRepository::get_in(&mut tx, shift_id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()))?;
        shift.ensure_accepts_sales()?;

        // (a) live stock
        for line in cart.lines() {
            let available = live_stock(&mut tx, &line.product_id).await?;
            if available < line.quantity {
                return Err(CoreError::StockChanged {
                    product_id: line.product_id.clone(),
                    available,
                    requested: line.quantity,
                }
                .into());
            }
        }

        // (b) live customer balances
        if let Some(customer_id) = customer_id {
            let account = CustomerRepository::get_in(&mut tx, customer_id)
                .await?
                .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;
            check_account_limits(&plan, &account)?;
        }

        // (c) stock
        for line in cart.lines() {
            if !ProductRepository::decrement_stock(&mut tx, &line.product_id, line.quantity, now)
                .await?
            {
                let available = live_stock(&mut tx, &line.product_id).await?;
                return Err(CoreError::StockChanged {
                    product_id: line.product_id.clone(),
                    available,
                    requested: line.quantity,
                }
                .into());
            }
        }

        // (d) customer account
        if let Some(customer_id) = customer_id {
            debit_account(&mut tx, customer_id, &plan, now).await?;
        }

        // (e) shift counter
        if plan.cash.is_positive() {
            record_sale_cash_in(&mut tx, shift_id, plan.cash).await?;
        }

        // (f) the sale itself
        let split = cart.tax_split();
        let sale = Sale {
            id: sale_id.to_string(),
            folio: SaleRepository::next_folio(&mut tx, shift_id, now).await?,
            shift_id: shift_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            lines: cart
                .lines()
                .iter()
                .map(|line| SaleLine {
                    product_id: line.product_id.clone(),
                    sku: line.sku.clone(),
                    name: line.name.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                    line_total: line.line_total(),
                })
                .collect(),
            tenders: tenders.to_vec(),
            subtotal: split.subtotal,
            tax: split.tax,
            total: cart.total(),
            created_at: now,
        };
        SaleRepository::insert(&mut tx, &sale).await?;

        Ok((tx, sale))
    }

    // =========================================================================
    // Reversal
    // =========================================================================

    /// Fully reverses a sale of a still ACTIVE shift.
    ///
    /// Restores stock and customer balances, takes the cash portion back
    /// out of the shift's expected cash, and records a [`SaleReversal`].
    pub async fn reverse_sale(&self, sale_id: &str, reason: &str) -> EngineResult<SaleReversal> {
        validate_text("reason", reason, MAX_REASON_LEN)?;

        let reversal = self
            .ctx
            .policy
            .run_tx("reverse_sale", move || self.reverse_once(sale_id, reason))
            .await?;

        info!(sale_id, reversal_id = %reversal.id, "Sale reversed");
        Ok(reversal)
    }

    async fn reverse_once(&self, sale_id: &str, reason: &str) -> EngineResult<(Tx, SaleReversal)> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.db.begin().await?;

        let sale = SaleRepository::get_in(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        let already_reversed = || -> EngineError {
            CoreError::AlreadyReversed {
                sale_id: sale_id.to_string(),
            }
            .into()
        };

        if SaleRepository::is_reversed_in(&mut tx, sale_id).await? {
            return Err(already_reversed());
        }

        let shift = ShiftRepository::get_in(&mut tx, &sale.shift_id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotFound(sale.shift_id.clone()))?;
        shift.ensure_accepts_sales()?;

        for line in &sale.lines {
            ProductRepository::increment_stock(&mut tx, &line.product_id, line.quantity, now)
                .await?;
        }

        if let Some(customer_id) = &sale.customer_id {
            let credit = tendered_by(&sale.tenders, TenderMethod::Credit);
            if credit.is_positive() {
                CustomerRepository::release_credit(&mut tx, customer_id, credit, now).await?;
            }
            let advance = tendered_by(&sale.tenders, TenderMethod::Advance);
            if advance.is_positive() {
                CustomerRepository::credit_advance(&mut tx, customer_id, advance, now).await?;
            }
        }

        let cash = sale.cash_portion();
        if cash.is_positive() {
            record_sale_cash_in(&mut tx, &sale.shift_id, -cash).await?;
        }

        let reversal = SaleReversal {
            id: Uuid::new_v4().to_string(),
            sale_id: sale.id.clone(),
            reason: reason.trim().to_string(),
            created_at: now,
        };
        match SaleRepository::insert_reversal(&mut tx, &reversal).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation_on("sale_id") => return Err(already_reversed()),
            Err(err) => return Err(err.into()),
        }

        Ok((tx, reversal))
    }
}

/// Current stock of a product inside the transaction; 0 if it vanished.
async fn live_stock(conn: &mut SqliteConnection, product_id: &str) -> EngineResult<Quantity> {
    let product = ProductRepository::get_in(conn, product_id).await?;
    Ok(product.map(|p| p.stock).unwrap_or(Quantity::zero()))
}

/// Step (d): guarded debits of the CREDIT and ADVANCE portions.
async fn debit_account(
    conn: &mut SqliteConnection,
    customer_id: &str,
    plan: &TenderPlan,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<()> {
    if plan.credit.is_positive()
        && !CustomerRepository::debit_credit(&mut *conn, customer_id, plan.credit, now).await?
    {
        let available = current_account(conn, customer_id).await?.credit_available;
        return Err(CoreError::InvalidTender(TenderIssue::CreditExceeded {
            available,
            requested: plan.credit,
        })
        .into());
    }

    if plan.advance.is_positive()
        && !CustomerRepository::debit_advance(&mut *conn, customer_id, plan.advance, now).await?
    {
        let available = current_account(conn, customer_id).await?.advance_balance;
        return Err(CoreError::InvalidTender(TenderIssue::AdvanceExceeded {
            available,
            requested: plan.advance,
        })
        .into());
    }

    debug!(customer_id, credit = %plan.credit, advance = %plan.advance, "Customer account debited");
    Ok(())
}

async fn current_account(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> EngineResult<CustomerAccount> {
    CustomerRepository::get_in(conn, customer_id)
        .await?
        .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()).into())
}
