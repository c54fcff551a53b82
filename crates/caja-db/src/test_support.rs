//! Fixtures shared by the repository tests.

use caja_core::{Money, Product, Quantity, Shift};
use chrono::Utc;
use uuid::Uuid;

use crate::repository::shift::ShiftRepository;
use crate::{Database, DbConfig};

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn product(sku: &str, price_cents: i64, stock_units: i64) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        barcode: Some(format!("750{sku}")),
        name: format!("Product {sku}"),
        unit_price: Money::from_cents(price_cents),
        tax_inclusive: true,
        stock: Quantity::from_units(stock_units),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub async fn open_shift(db: &Database, till_id: &str, float_cents: i64) -> Shift {
    let shift = Shift::open(
        Uuid::new_v4().to_string(),
        till_id,
        "cashier-1",
        Money::from_cents(float_cents),
        Utc::now(),
    )
    .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    ShiftRepository::insert(&mut conn, &shift).await.unwrap();
    shift
}
