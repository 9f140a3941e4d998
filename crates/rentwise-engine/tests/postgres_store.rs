//! Runs against a real PostgreSQL database.
//!
//! `RENTWISE_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{Duration, Utc};
use futures::future::join_all;
use rentwise_engine::config::DatabaseConfig;
use rentwise_engine::domain::{
    ConfirmOrderRequest, DurationKind, GstInvoiceGenerator, Money, OrderLifecycle,
    OrderLineRequest, OrderStatus, PaymentStatus, ProductId, ReservationStatus,
    TracingNotificationSink, UserId,
};
use rentwise_engine::storage::{PgReservationStore, ReservationStore, SqlProductCatalog};
use rentwise_engine::{ErrorKind, RentalSettings};
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> PgReservationStore {
    let url = std::env::var("RENTWISE_TEST_DATABASE_URL")
        .expect("RENTWISE_TEST_DATABASE_URL must be set for PostgreSQL tests");
    let config = DatabaseConfig {
        url,
        max_connections: 8,
        ..DatabaseConfig::default()
    };
    let store = PgReservationStore::connect(&config)
        .await
        .expect("Failed to connect to database");
    store.migrate().await.expect("Failed to run migrations");
    store
}

/// Inserts a product with a unique id so tests do not see each other's stock.
async fn seed_product(store: &PgReservationStore, vendor: &UserId, quantity: i32) -> ProductId {
    let id = ProductId::new(format!("projector-{}", Uuid::new_v4()));
    sqlx::query(
        r#"
        INSERT INTO rental.products
        (id, vendor_id, name, quantity_on_hand, variants, rental_pricing, security_deposit)
        VALUES ($1, $2, 'Projector', $3, '[]'::jsonb, $4, 500)
        "#,
    )
    .bind(id.as_str())
    .bind(vendor.as_str())
    .bind(quantity)
    .bind(serde_json::json!({ "daily": "1000", "hourly": null, "weekly": null, "custom": null }))
    .execute(store.pool())
    .await
    .expect("Failed to seed product");
    id
}

fn lifecycle(store: &PgReservationStore) -> OrderLifecycle {
    OrderLifecycle::new(
        Arc::new(SqlProductCatalog::new(store.pool().clone())),
        Arc::new(store.clone()),
        Arc::new(GstInvoiceGenerator),
        Arc::new(TracingNotificationSink),
        RentalSettings::default(),
    )
}

fn request(product: &ProductId, vendor: &UserId, quantity: u32) -> ConfirmOrderRequest {
    let start = Utc::now() + Duration::days(30);
    ConfirmOrderRequest {
        customer_id: UserId::new(format!("customer-{}", Uuid::new_v4())),
        vendor_id: vendor.clone(),
        lines: vec![OrderLineRequest {
            product_id: product.clone(),
            variant_id: None,
            quantity,
            start_date: start,
            end_date: start + Duration::days(2),
            duration_kind: DurationKind::Daily,
        }],
        payment_status: PaymentStatus::Pending,
    }
}

#[tokio::test]
#[ignore]
async fn test_pg_lifecycle_round_trip() {
    let store = store().await;
    let vendor = UserId::new(format!("vendor-{}", Uuid::new_v4()));
    let product = seed_product(&store, &vendor, 2).await;
    let lifecycle = lifecycle(&store);

    let order = lifecycle
        .confirm_order(request(&product, &vendor, 2))
        .await
        .expect("Failed to confirm order");
    assert_eq!(order.total_amount, Money::from_major(2000));
    assert_eq!(order.deposit_paid, Money::from_major(500));

    let loaded = lifecycle.get_order(&order.id).await.unwrap();
    assert_eq!(loaded.lines, order.lines);
    assert_eq!(loaded.status, OrderStatus::Confirmed);
    assert!(store.invoice_for_order(&order.id).await.unwrap().is_some());

    let blocked = lifecycle
        .confirm_order(request(&product, &vendor, 1))
        .await
        .unwrap_err();
    assert_eq!(blocked.kind(), ErrorKind::Availability);

    lifecycle.cancel_order(&order.id, &vendor).await.unwrap();
    let reservations = store.reservations_for_order(&order.id).await.unwrap();
    assert!(reservations
        .iter()
        .all(|r| r.status == ReservationStatus::Cancelled));

    lifecycle
        .confirm_order(request(&product, &vendor, 1))
        .await
        .expect("capacity should be free after cancellation");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_pg_concurrent_confirmations_do_not_oversell() {
    let store = store().await;
    let vendor = UserId::new(format!("vendor-{}", Uuid::new_v4()));
    let product = seed_product(&store, &vendor, 3).await;
    let lifecycle = Arc::new(lifecycle(&store));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            let request = request(&product, &vendor, 1);
            tokio::spawn(async move { lifecycle.confirm_order(request).await })
        })
        .collect();

    let confirmed = join_all(tasks)
        .await
        .into_iter()
        .filter(|outcome| matches!(outcome, Ok(Ok(_))))
        .count();
    assert_eq!(confirmed, 3);
}
