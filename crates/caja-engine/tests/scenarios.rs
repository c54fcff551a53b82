//! End-to-end scenarios: cart → commit → close → settle → reconcile.
//!
//! Most tests run against an in-memory database. The concurrency tests use
//! a temporary file so several connections really write at once.

use std::path::PathBuf;
use std::sync::Arc;

use caja_core::{
    tendered_by, CoreError, FixedClock, Money, MovementKind, MovementOrigin, Product, Quantity,
    ReceiptKind, ShiftStatus, SystemClock, Tender, TenderIssue, TenderMethod,
};
use caja_db::{Database, DbConfig};
use caja_engine::{Engine, EngineConfig, EngineError};
use chrono::{Duration, Utc};
use uuid::Uuid;

// =============================================================================
// Fixtures
// =============================================================================

async fn memory_engine() -> Engine {
    memory_engine_with(EngineConfig::default()).await
}

async fn memory_engine_with(config: EngineConfig) -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let clock = Arc::new(FixedClock::new(Utc::now()));
    Engine::with_database(db, &config, clock).unwrap()
}

/// File-backed engine with a generous retry budget for contention tests.
async fn file_engine() -> (Engine, PathBuf) {
    let path = std::env::temp_dir().join(format!("caja-test-{}.db", Uuid::new_v4()));

    let mut config = EngineConfig::default();
    config.database.path = Some(path.clone());
    config.database.max_connections = 8;
    config.transactions.max_retries = 50;
    config.transactions.initial_backoff_ms = 2;
    config.transactions.max_backoff_ms = 40;
    config.transactions.timeout_ms = 10_000;

    (Engine::open(&config).await.unwrap(), path)
}

async fn remove_db(engine: Engine, path: PathBuf) {
    engine.db().close().await;
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.clone().into_os_string();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

async fn add_product(engine: &Engine, sku: &str, price_cents: i64, stock: Quantity) -> Product {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        barcode: None,
        name: format!("Producto {sku}"),
        unit_price: Money::from_cents(price_cents),
        tax_inclusive: true,
        stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    engine.db().products().insert(&product).await.unwrap();
    product
}

async fn add_till(engine: &Engine, name: &str) -> String {
    engine.db().tills().create(name, Utc::now()).await.unwrap().id
}

async fn add_account(engine: &Engine) -> String {
    engine
        .db()
        .bank()
        .create_account("Operativa", "BBVA", Utc::now())
        .await
        .unwrap()
        .id
}

fn core(err: EngineError) -> CoreError {
    match err {
        EngineError::Core(err) => err,
        other => panic!("expected a business error, got {other:?}"),
    }
}

fn cash(cents: i64) -> Tender {
    Tender::cash(Money::from_cents(cents))
}

fn tender(method: TenderMethod, cents: i64) -> Tender {
    Tender::new(method, Money::from_cents(cents))
}

// =============================================================================
// Full shift lifecycle
// =============================================================================

#[tokio::test]
async fn float_cash_sale_close_and_settle() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let account = add_account(&engine).await;
    add_product(&engine, "HUEVO-12", 5_800, Quantity::from_units(10)).await;

    let shift = engine
        .shifts()
        .open(&till, "ana", Money::from_cents(50_000))
        .await
        .unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "HUEVO-12", Quantity::from_units(2))
        .await
        .unwrap();
    let total = cart.total();
    assert_eq!(total.cents(), 11_600);

    let sale = checkout
        .commit(&shift.id, &mut cart, &[cash(11_600)], None)
        .await
        .unwrap();
    assert!(cart.is_empty());
    assert_eq!(sale.total, total);
    assert!(sale.folio.ends_with("-0001"));

    let product = checkout.lookup_product("HUEVO-12").await.unwrap();
    assert_eq!(product.stock, Quantity::from_units(8));

    let active = engine.shifts().get(&shift.id).await.unwrap();
    assert_eq!(active.expected_cash.cents(), 11_600);

    let closed = engine
        .shifts()
        .close(&shift.id, Money::from_cents(61_600))
        .await
        .unwrap();
    assert_eq!(closed.variance, Some(Money::zero()));

    let movement = engine.shifts().settle(&shift.id, &account).await.unwrap();
    assert_eq!(movement.kind, MovementKind::Ingreso);
    assert_eq!(movement.origin, MovementOrigin::ShiftDeposit);
    assert_eq!(movement.amount.cents(), 61_600);
    assert_eq!(movement.origin_ref.as_deref(), Some(shift.id.as_str()));

    let movements = engine.db().bank().movements(&account).await.unwrap();
    assert_eq!(movements.len(), 1);

    let balance = engine.treasury().account(&account).await.unwrap().balance;
    assert_eq!(balance.cents(), 61_600);
    assert_eq!(engine.db().bank().ledger_sum(&account).await.unwrap(), balance);

    let settled = engine.shifts().get(&shift.id).await.unwrap();
    assert_eq!(settled.status, ShiftStatus::Settled);
    assert!(settled.settled_at.is_some());
}

#[tokio::test]
async fn settling_twice_yields_one_movement() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let account = add_account(&engine).await;

    let shift = engine
        .shifts()
        .open(&till, "ana", Money::from_cents(20_000))
        .await
        .unwrap();

    let err = engine.treasury().deposit_shift(&shift.id, &account).await.unwrap_err();
    assert!(matches!(core(err), CoreError::ShiftNotClosed { .. }));

    engine
        .shifts()
        .close(&shift.id, Money::from_cents(20_000))
        .await
        .unwrap();

    let err = engine.treasury().deposit_shift(&shift.id, "missing").await.unwrap_err();
    assert!(matches!(core(err), CoreError::AccountNotFound(_)));

    engine.treasury().deposit_shift(&shift.id, &account).await.unwrap();
    let err = engine.treasury().deposit_shift(&shift.id, &account).await.unwrap_err();
    assert!(matches!(core(err), CoreError::AlreadySettled { .. }));

    assert_eq!(engine.db().bank().movements(&account).await.unwrap().len(), 1);
    assert_eq!(
        engine.treasury().account(&account).await.unwrap().balance.cents(),
        20_000
    );
}

#[tokio::test]
async fn empty_drawer_settles_with_zero_deposit() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let account = add_account(&engine).await;

    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();
    engine.shifts().close(&shift.id, Money::zero()).await.unwrap();

    let movement = engine.treasury().deposit_shift(&shift.id, &account).await.unwrap();
    assert!(movement.amount.is_zero());
    assert!(engine
        .db()
        .bank()
        .deposit_for_shift(&shift.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn second_open_on_same_till_fails() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let other_till = add_till(&engine, "Caja 2").await;

    let first = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();
    let err = engine.shifts().open(&till, "luis", Money::zero()).await.unwrap_err();
    match core(err) {
        CoreError::ShiftAlreadyActive { till_id, shift_id } => {
            assert_eq!(till_id, till);
            assert_eq!(shift_id, first.id);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Other tills are independent.
    engine.shifts().open(&other_till, "luis", Money::zero()).await.unwrap();
}

#[tokio::test]
async fn closed_shift_rejects_sales() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    add_product(&engine, "AGUA-1L", 1_400, Quantity::from_units(5)).await;

    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();
    engine.shifts().close(&shift.id, Money::zero()).await.unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "AGUA-1L", Quantity::ONE)
        .await
        .unwrap();

    let err = checkout
        .commit(&shift.id, &mut cart, &[cash(1_400)], None)
        .await
        .unwrap_err();
    assert!(matches!(core(err), CoreError::ShiftClosed { .. }));
    assert!(!cart.is_empty());

    let product = checkout.lookup_product("AGUA-1L").await.unwrap();
    assert_eq!(product.stock, Quantity::from_units(5));
}

// =============================================================================
// Cart and tenders
// =============================================================================

#[tokio::test]
async fn stock_limits_when_building_the_cart() {
    let engine = memory_engine().await;
    add_product(&engine, "AGOTADO", 1_000, Quantity::zero()).await;
    add_product(&engine, "PAN", 4_800, Quantity::from_units(3)).await;

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();

    let err = checkout
        .add_to_cart(&mut cart, "AGOTADO", Quantity::ONE)
        .await
        .unwrap_err();
    assert!(matches!(core(err), CoreError::OutOfStock { .. }));

    for _ in 0..3 {
        checkout.add_to_cart(&mut cart, "PAN", Quantity::ONE).await.unwrap();
    }
    let err = checkout
        .add_to_cart(&mut cart, "PAN", Quantity::ONE)
        .await
        .unwrap_err();
    match core(err) {
        CoreError::StockExceeded {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, Quantity::from_units(3));
            assert_eq!(requested, Quantity::from_units(4));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.lines()[0].quantity, Quantity::from_units(3));

    let err = checkout
        .add_to_cart(&mut cart, "NO-EXISTE", Quantity::ONE)
        .await
        .unwrap_err();
    assert!(matches!(core(err), CoreError::ProductNotFound(_)));
}

#[tokio::test]
async fn split_tender_must_match_total() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    add_product(&engine, "HUEVO-12", 5_800, Quantity::from_units(10)).await;
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "HUEVO-12", Quantity::from_units(2))
        .await
        .unwrap();

    let short = [cash(7_000), tender(TenderMethod::Transfer, 4_000)];
    let err = checkout
        .commit(&shift.id, &mut cart, &short, None)
        .await
        .unwrap_err();
    match core(err) {
        CoreError::InvalidTender(TenderIssue::SumMismatch { shortfall, .. }) => {
            assert_eq!(shortfall.cents(), 600)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!cart.is_empty());

    let exact = [cash(7_000), tender(TenderMethod::Transfer, 4_600)];
    let sale = checkout
        .commit(&shift.id, &mut cart, &exact, None)
        .await
        .unwrap();
    assert_eq!(sale.tenders, exact.to_vec());

    // Only the cash portion reaches the drawer.
    let shift = engine.shifts().get(&shift.id).await.unwrap();
    assert_eq!(shift.expected_cash.cents(), 7_000);

    let summary = engine.shifts().summary(&shift.id).await.unwrap();
    assert_eq!(summary.sale_count, 1);
    assert_eq!(
        tendered_by(&summary.tender_totals, TenderMethod::Transfer).cents(),
        4_600
    );
}

#[tokio::test]
async fn credit_needs_a_customer_with_room() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    add_product(&engine, "HUEVO-12", 5_800, Quantity::from_units(10)).await;
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();
    let small = engine
        .db()
        .customers()
        .create("Cocina Lupe", Money::from_cents(10_000), Utc::now())
        .await
        .unwrap();
    let large = engine
        .db()
        .customers()
        .create("Ferretería Sol", Money::from_cents(100_000), Utc::now())
        .await
        .unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "HUEVO-12", Quantity::from_units(2))
        .await
        .unwrap();
    let on_credit = [tender(TenderMethod::Credit, 11_600)];

    let err = checkout
        .commit(&shift.id, &mut cart, &on_credit, None)
        .await
        .unwrap_err();
    assert!(matches!(core(err), CoreError::CustomerRequired { .. }));

    let err = checkout
        .commit(&shift.id, &mut cart, &on_credit, Some(small.id.as_str()))
        .await
        .unwrap_err();
    assert!(matches!(
        core(err),
        CoreError::InvalidTender(TenderIssue::CreditExceeded { .. })
    ));

    let err = checkout
        .commit(&shift.id, &mut cart, &on_credit, Some("missing"))
        .await
        .unwrap_err();
    assert!(matches!(core(err), CoreError::CustomerNotFound(_)));

    // Nothing moved on the failed attempts.
    let product = checkout.lookup_product("HUEVO-12").await.unwrap();
    assert_eq!(product.stock, Quantity::from_units(10));

    let sale = checkout
        .commit(&shift.id, &mut cart, &on_credit, Some(large.id.as_str()))
        .await
        .unwrap();
    assert_eq!(sale.customer_id.as_deref(), Some(large.id.as_str()));

    let account = checkout.get_account(&large.id).await.unwrap();
    assert_eq!(account.credit_available.cents(), 100_000 - 11_600);

    let shift = engine.shifts().get(&shift.id).await.unwrap();
    assert!(shift.expected_cash.is_zero());
}

#[tokio::test]
async fn advance_receipt_then_spend() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let account = add_account(&engine).await;
    add_product(&engine, "CAFE-250", 9_500, Quantity::from_units(4)).await;
    let customer = engine
        .db()
        .customers()
        .create("Cocina Lupe", Money::zero(), Utc::now())
        .await
        .unwrap();
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

    engine
        .treasury()
        .post_customer_receipt(
            &customer.id,
            &account,
            Money::from_cents(10_000),
            ReceiptKind::Advance,
        )
        .await
        .unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "CAFE-250", Quantity::ONE)
        .await
        .unwrap();
    checkout
        .commit(
            &shift.id,
            &mut cart,
            &[tender(TenderMethod::Advance, 9_500)],
            Some(customer.id.as_str()),
        )
        .await
        .unwrap();

    let left = checkout.get_account(&customer.id).await.unwrap();
    assert_eq!(left.advance_balance.cents(), 500);

    // The next coffee needs more than the remaining advance.
    checkout
        .add_to_cart(&mut cart, "CAFE-250", Quantity::ONE)
        .await
        .unwrap();
    let err = checkout
        .commit(
            &shift.id,
            &mut cart,
            &[tender(TenderMethod::Advance, 9_500)],
            Some(customer.id.as_str()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        core(err),
        CoreError::InvalidTender(TenderIssue::AdvanceExceeded { .. })
    ));
}

#[tokio::test]
async fn empty_cart_is_rejected_before_any_write() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

    let mut cart = engine.checkout().new_cart();
    let err = engine
        .checkout()
        .commit(&shift.id, &mut cart, &[cash(100)], None)
        .await
        .unwrap_err();
    assert!(matches!(core(err), CoreError::Validation(_)));
}

#[tokio::test]
async fn persisted_total_matches_cart_total() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

    let now = Utc::now();
    let plain = Product {
        id: Uuid::new_v4().to_string(),
        sku: "ARROZ-1K".into(),
        barcode: Some("7501234567890".into()),
        name: "Arroz 1 kg".into(),
        unit_price: Money::from_cents(3_199),
        tax_inclusive: false,
        stock: Quantity::from_units(100),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    engine.db().products().insert(&plain).await.unwrap();
    add_product(&engine, "QUESO-KG", 18_990, Quantity::from_units(50)).await;
    add_product(&engine, "CHICLE", 1, Quantity::from_units(1_000)).await;

    let compositions: &[&[(&str, Quantity)]] = &[
        &[("ARROZ-1K", Quantity::from_units(3))],
        &[("QUESO-KG", Quantity::from_milli(1_375))],
        &[
            ("7501234567890", Quantity::from_milli(2_500)),
            ("QUESO-KG", Quantity::from_milli(333)),
            ("CHICLE", Quantity::from_units(7)),
        ],
        &[("CHICLE", Quantity::from_milli(1_500))],
    ];

    let checkout = engine.checkout();
    for lines in compositions {
        let mut cart = checkout.new_cart();
        for (code, qty) in lines.iter() {
            checkout.add_to_cart(&mut cart, code, *qty).await.unwrap();
        }
        let total = cart.total();

        let sale = checkout
            .commit(&shift.id, &mut cart, &[Tender::cash(total)], None)
            .await
            .unwrap();
        assert_eq!(sale.total, total);
        assert_eq!(sale.subtotal + sale.tax, sale.total);

        let stored = engine.db().sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored, sale);
        let tendered: Money = stored.tenders.iter().map(|t| t.amount).sum();
        assert_eq!(tendered, stored.total);
    }
}

// =============================================================================
// Reversal
// =============================================================================

#[tokio::test]
async fn reversal_restores_everything_once() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    add_product(&engine, "HUEVO-12", 5_800, Quantity::from_units(10)).await;
    let customer = engine
        .db()
        .customers()
        .create("Ferretería Sol", Money::from_cents(100_000), Utc::now())
        .await
        .unwrap();
    let shift = engine
        .shifts()
        .open(&till, "ana", Money::from_cents(10_000))
        .await
        .unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "HUEVO-12", Quantity::from_units(2))
        .await
        .unwrap();
    let sale = checkout
        .commit(
            &shift.id,
            &mut cart,
            &[cash(5_000), tender(TenderMethod::Credit, 6_600)],
            Some(customer.id.as_str()),
        )
        .await
        .unwrap();

    let err = checkout.reverse_sale(&sale.id, "   ").await.unwrap_err();
    assert!(matches!(core(err), CoreError::Validation(_)));

    let reversal = checkout
        .reverse_sale(&sale.id, "Cliente devolvió producto")
        .await
        .unwrap();
    assert_eq!(reversal.sale_id, sale.id);

    let product = checkout.lookup_product("HUEVO-12").await.unwrap();
    assert_eq!(product.stock, Quantity::from_units(10));
    let account = checkout.get_account(&customer.id).await.unwrap();
    assert_eq!(account.credit_available.cents(), 100_000);
    let current = engine.shifts().get(&shift.id).await.unwrap();
    assert!(current.expected_cash.is_zero());

    let summary = engine.shifts().summary(&shift.id).await.unwrap();
    assert_eq!(summary.sale_count, 1);
    assert_eq!(summary.reversed_count, 1);
    assert!(summary.tender_totals.is_empty());

    let err = checkout.reverse_sale(&sale.id, "otra vez").await.unwrap_err();
    assert!(matches!(core(err), CoreError::AlreadyReversed { .. }));

    let err = checkout.reverse_sale("missing", "x").await.unwrap_err();
    assert!(matches!(core(err), CoreError::SaleNotFound(_)));
}

#[tokio::test]
async fn reversal_after_close_is_refused() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    add_product(&engine, "AGUA-1L", 1_400, Quantity::from_units(5)).await;
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

    let checkout = engine.checkout();
    let mut cart = checkout.new_cart();
    checkout
        .add_to_cart(&mut cart, "AGUA-1L", Quantity::ONE)
        .await
        .unwrap();
    let sale = checkout
        .commit(&shift.id, &mut cart, &[cash(1_400)], None)
        .await
        .unwrap();

    engine
        .shifts()
        .close(&shift.id, Money::from_cents(1_400))
        .await
        .unwrap();

    let err = checkout.reverse_sale(&sale.id, "tarde").await.unwrap_err();
    assert!(matches!(core(err), CoreError::ShiftClosed { .. }));
    assert!(engine.db().sales().reversal_for(&sale.id).await.unwrap().is_none());
}

// =============================================================================
// Listings and reconciliation
// =============================================================================

#[tokio::test]
async fn pending_shifts_page_in_close_order() {
    let mut config = EngineConfig::default();
    config.listing.page_size = 2;

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let engine = Engine::with_database(db, &config, clock.clone()).unwrap();
    let account = add_account(&engine).await;

    let mut closed = Vec::new();
    for (i, declared) in [10_000, 20_000, 30_000].into_iter().enumerate() {
        let till = add_till(&engine, &format!("Caja {i}")).await;
        let shift = engine
            .shifts()
            .open(&till, "ana", Money::from_cents(10_000))
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));
        engine
            .shifts()
            .close(&shift.id, Money::from_cents(declared))
            .await
            .unwrap();
        closed.push(shift.id);
    }

    let treasury = engine.treasury();
    let mut listing = treasury.list_pending_shifts();
    let first = listing.next().await.unwrap().unwrap();
    assert_eq!(first.shift_id, closed[0]);
    assert!(first.variance.is_zero());

    let cursor = listing.cursor().cloned().unwrap();
    let rest = listing.collect_remaining().await.unwrap();
    let ids: Vec<_> = rest.iter().map(|p| p.shift_id.clone()).collect();
    assert_eq!(ids, closed[1..].to_vec());
    assert_eq!(rest[1].variance.cents(), 20_000);
    assert!(listing.next().await.unwrap().is_none());

    let resumed = treasury
        .list_pending_after(cursor)
        .collect_remaining()
        .await
        .unwrap();
    assert_eq!(resumed.len(), 2);

    treasury.deposit_shift(&closed[1], &account).await.unwrap();
    listing.restart();
    let after_deposit: Vec<_> = listing
        .collect_remaining()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.shift_id)
        .collect();
    assert_eq!(after_deposit, vec![closed[0].clone(), closed[2].clone()]);
}

#[tokio::test]
async fn conciliating_twice_fails() {
    let engine = memory_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let account = add_account(&engine).await;
    let shift = engine
        .shifts()
        .open(&till, "ana", Money::from_cents(5_000))
        .await
        .unwrap();
    engine
        .shifts()
        .close(&shift.id, Money::from_cents(5_000))
        .await
        .unwrap();
    let deposit = engine.treasury().deposit_shift(&shift.id, &account).await.unwrap();

    let reconciliation = engine.reconciliation();
    let open = reconciliation
        .list_unconciliated(None)
        .collect_remaining()
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, deposit.id);

    reconciliation.conciliate(&deposit.id).await.unwrap();
    let err = reconciliation.conciliate(&deposit.id).await.unwrap_err();
    assert!(matches!(core(err), CoreError::AlreadyConciliated { .. }));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settles_produce_one_deposit() {
    let (engine, path) = file_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    let account = add_account(&engine).await;
    let shift = engine
        .shifts()
        .open(&till, "ana", Money::from_cents(30_000))
        .await
        .unwrap();
    engine
        .shifts()
        .close(&shift.id, Money::from_cents(30_000))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = engine.clone();
        let shift_id = shift.id.clone();
        let account = account.clone();
        handles.push(tokio::spawn(async move {
            engine.treasury().deposit_shift(&shift_id, &account).await
        }));
    }

    let mut deposited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => deposited += 1,
            Err(err) => assert!(matches!(core(err), CoreError::AlreadySettled { .. })),
        }
    }
    assert_eq!(deposited, 1);
    assert_eq!(engine.db().bank().movements(&account).await.unwrap().len(), 1);
    assert_eq!(
        engine.treasury().account(&account).await.unwrap().balance.cents(),
        30_000
    );

    remove_db(engine, path).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_sells_once() {
    let (engine, path) = file_engine().await;
    add_product(&engine, "ULTIMO", 2_000, Quantity::ONE).await;

    let mut shifts = Vec::new();
    for name in ["Caja 1", "Caja 2"] {
        let till = add_till(&engine, name).await;
        let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();
        shifts.push(shift.id);
    }

    // Both carts see one unit available.
    let mut handles = Vec::new();
    for shift_id in shifts {
        let engine = engine.clone();
        let mut cart = engine.checkout().new_cart();
        engine
            .checkout()
            .add_to_cart(&mut cart, "ULTIMO", Quantity::ONE)
            .await
            .unwrap();
        handles.push(tokio::spawn(async move {
            engine
                .checkout()
                .commit(&shift_id, &mut cart, &[cash(2_000)], None)
                .await
        }));
    }

    let mut sold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sold += 1,
            Err(err) => assert!(matches!(core(err), CoreError::StockChanged { .. })),
        }
    }
    assert_eq!(sold, 1);

    let product = engine.checkout().lookup_product("ULTIMO").await.unwrap();
    assert_eq!(product.stock, Quantity::zero());

    remove_db(engine, path).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn customer_balances_are_not_overdrawn_by_concurrent_sales() {
    let (engine, path) = file_engine().await;
    let account = add_account(&engine).await;
    add_product(&engine, "CEMENTO", 1_000, Quantity::from_units(100)).await;
    let customer = engine
        .db()
        .customers()
        .create("Ferretería El Sol", Money::from_cents(1_500), Utc::now())
        .await
        .unwrap();
    engine
        .treasury()
        .post_customer_receipt(
            &customer.id,
            &account,
            Money::from_cents(1_500),
            ReceiptKind::Advance,
        )
        .await
        .unwrap();

    let mut shifts = Vec::new();
    for n in 1..=4 {
        let till = add_till(&engine, &format!("Caja {n}")).await;
        let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();
        shifts.push(shift.id);
    }

    // $15.00 of room on each balance, four tills asking for $10.00 at once.
    for method in [TenderMethod::Credit, TenderMethod::Advance] {
        let mut handles = Vec::new();
        for shift_id in shifts.clone() {
            let engine = engine.clone();
            let customer_id = customer.id.clone();
            handles.push(tokio::spawn(async move {
                let checkout = engine.checkout();
                let mut cart = checkout.new_cart();
                checkout
                    .add_to_cart(&mut cart, "CEMENTO", Quantity::ONE)
                    .await?;
                checkout
                    .commit(
                        &shift_id,
                        &mut cart,
                        &[tender(method, 1_000)],
                        Some(customer_id.as_str()),
                    )
                    .await
            }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(err) => match core(err) {
                    CoreError::InvalidTender(TenderIssue::CreditExceeded { requested, .. }) => {
                        assert_eq!(method, TenderMethod::Credit);
                        assert_eq!(requested.cents(), 1_000);
                    }
                    CoreError::InvalidTender(TenderIssue::AdvanceExceeded { requested, .. }) => {
                        assert_eq!(method, TenderMethod::Advance);
                        assert_eq!(requested.cents(), 1_000);
                    }
                    other => panic!("expected a limit error, got {other:?}"),
                },
            }
        }
        assert_eq!(sold, 1, "{method:?}");
    }

    let balances = engine.checkout().get_account(&customer.id).await.unwrap();
    assert_eq!(balances.credit_available.cents(), 500);
    assert_eq!(balances.advance_balance.cents(), 500);

    let product = engine.checkout().lookup_product("CEMENTO").await.unwrap();
    assert_eq!(product.stock, Quantity::from_units(98));

    remove_db(engine, path).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cash_sales_sum_exactly() {
    let (engine, path) = file_engine().await;
    let till = add_till(&engine, "Caja 1").await;
    add_product(&engine, "CHICLE", 137, Quantity::from_units(1_000)).await;
    let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

    let mut handles = Vec::new();
    for units in 1..=10i64 {
        let engine = engine.clone();
        let shift_id = shift.id.clone();
        handles.push(tokio::spawn(async move {
            let checkout = engine.checkout();
            let mut cart = checkout.new_cart();
            checkout
                .add_to_cart(&mut cart, "CHICLE", Quantity::from_units(units))
                .await?;
            let total = cart.total();
            checkout
                .commit(&shift_id, &mut cart, &[Tender::cash(total)], None)
                .await
        }));
    }

    let mut expected = Money::zero();
    for handle in handles {
        let sale = handle.await.unwrap().unwrap();
        expected += sale.cash_portion();
    }

    let shift = engine.shifts().get(&shift.id).await.unwrap();
    assert_eq!(shift.expected_cash, expected);
    assert_eq!(expected.cents(), 137 * 55);

    let summary = engine.shifts().summary(&shift.id).await.unwrap();
    assert_eq!(summary.sale_count, 10);

    remove_db(engine, path).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tight_deadlines_never_apply_a_write_twice() {
    for round in 0..20u64 {
        let (engine, path) = file_engine().await;
        let till = add_till(&engine, "Caja 1").await;
        let product = add_product(&engine, "REFRESCO", 1_000, Quantity::from_units(10)).await;
        let shift = engine.shifts().open(&till, "ana", Money::zero()).await.unwrap();

        let mut tight = EngineConfig::default();
        tight.transactions.timeout_ms = 1 + round % 3;
        tight.transactions.max_retries = 50;
        tight.transactions.initial_backoff_ms = 1;
        tight.transactions.max_backoff_ms = 5;
        let hurried =
            Engine::with_database(engine.db().clone(), &tight, Arc::new(SystemClock)).unwrap();

        let checkout = hurried.checkout();
        let mut cart = checkout.new_cart();
        cart.add_item(&product, Quantity::ONE).unwrap();
        let outcome = checkout.commit(&shift.id, &mut cart, &[cash(1_000)], None).await;

        let sales = engine.db().sales().list_for_shift(&shift.id).await.unwrap();
        match outcome {
            Ok(sale) => {
                assert_eq!(sales.len(), 1, "round {round}");
                assert_eq!(sales[0].id, sale.id);
                assert!(cart.is_empty());
            }
            Err(err) => {
                assert!(
                    matches!(err, EngineError::Unavailable { .. }),
                    "round {round}: {err:?}"
                );
                assert!(sales.is_empty(), "round {round}");
                assert!(!cart.is_empty());
            }
        }

        let landed = sales.len() as i64;
        let shift = engine.shifts().get(&shift.id).await.unwrap();
        assert_eq!(shift.expected_cash.cents(), 1_000 * landed, "round {round}");
        let stored = engine.db().products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, Quantity::from_units(10 - landed), "round {round}");

        let account = add_account(&engine).await;
        let egress = hurried
            .treasury()
            .record_egress(&account, Money::from_cents(700), "Papelería")
            .await;
        let movements = engine.db().bank().movements(&account).await.unwrap();
        assert_eq!(movements.len(), usize::from(egress.is_ok()), "round {round}");
        let balance = engine.treasury().account(&account).await.unwrap().balance;
        assert_eq!(balance.cents(), -700 * movements.len() as i64, "round {round}");

        drop(hurried);
        remove_db(engine, path).await;
    }
}
