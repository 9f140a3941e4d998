#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rentwise_engine::domain::{
    ConfirmOrderRequest, DurationKind, GstInvoiceGenerator, InvoiceGenerator, Money,
    NotificationSink, OrderLifecycle, OrderLineRequest, PaymentStatus, Product, ProductId,
    RentalPricing, TracingNotificationSink, UserId,
};
use rentwise_engine::storage::{InMemoryProductCatalog, MemoryReservationStore};
use rentwise_engine::RentalSettings;
use std::sync::Arc;

pub const VENDOR: &str = "vendor-1";
pub const CUSTOMER: &str = "customer-1";

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap()
}

pub fn vendor() -> UserId {
    UserId::new(VENDOR)
}

pub fn customer() -> UserId {
    UserId::new(CUSTOMER)
}

/// Two units at ₹1000/day with a ₹500 deposit.
pub fn camera() -> Product {
    Product {
        id: ProductId::new("camera"),
        vendor_id: vendor(),
        name: "Mirrorless camera".to_string(),
        quantity_on_hand: 2,
        variants: vec![],
        rental_pricing: Some(RentalPricing {
            daily: Some(Money::from_major(1000)),
            ..Default::default()
        }),
        security_deposit: Some(Money::from_major(500)),
    }
}

pub fn settings() -> RentalSettings {
    RentalSettings {
        late_fee_per_day: Money::from_major(100),
        ..RentalSettings::default()
    }
}

pub struct Harness {
    pub lifecycle: OrderLifecycle,
    pub store: MemoryReservationStore,
    pub catalog: InMemoryProductCatalog,
}

pub fn harness_with(
    invoices: Arc<dyn InvoiceGenerator>,
    notifications: Arc<dyn NotificationSink>,
) -> Harness {
    let store = MemoryReservationStore::new();
    let catalog = InMemoryProductCatalog::with_products([camera()]);
    let lifecycle = OrderLifecycle::new(
        Arc::new(catalog.clone()),
        Arc::new(store.clone()),
        invoices,
        notifications,
        settings(),
    );
    Harness {
        lifecycle,
        store,
        catalog,
    }
}

pub fn harness() -> Harness {
    harness_with(Arc::new(GstInvoiceGenerator), Arc::new(TracingNotificationSink))
}

pub fn camera_request(
    quantity: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ConfirmOrderRequest {
    ConfirmOrderRequest {
        customer_id: customer(),
        vendor_id: vendor(),
        lines: vec![OrderLineRequest {
            product_id: ProductId::new("camera"),
            variant_id: None,
            quantity,
            start_date: start,
            end_date: end,
            duration_kind: DurationKind::Daily,
        }],
        payment_status: PaymentStatus::Paid,
    }
}
