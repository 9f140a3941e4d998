mod common;

use async_trait::async_trait;
use common::*;
use mockall::mock;
use pretty_assertions::assert_eq;
use rentwise_engine::domain::{
    DurationKind, GstInvoiceGenerator, Invoice, InvoiceGenerator, Money, Notification,
    NotificationKind, NotificationSink, OrderStatus, PricingEngine, ProductId,
    QueuedNotificationSink, RentalOrder, RentalPeriod, ReservationStatus, TrustedCallerPolicy,
    UserId,
};
use rentwise_engine::storage::ReservationStore;
use rentwise_engine::{ErrorKind, RentalError};
use rust_decimal::Decimal;
use std::sync::Arc;

mock! {
    Sink {}

    #[async_trait]
    impl NotificationSink for Sink {
        async fn notify(&self, notification: Notification) -> rentwise_engine::Result<()>;
    }
}

struct FailingInvoices;

impl InvoiceGenerator for FailingInvoices {
    fn create_invoice_from_order(
        &self,
        order: &RentalOrder,
        _tax_rate: Decimal,
    ) -> rentwise_engine::Result<Invoice> {
        Err(RentalError::Configuration(format!(
            "vendor {} has no GSTIN on file",
            order.vendor_id
        )))
    }
}

#[test_log::test(tokio::test)]
async fn test_rental_scenario_from_confirmation_to_late_return() {
    let h = harness();
    let period = RentalPeriod::new(at(1), at(3)).unwrap();

    let quote = PricingEngine::price(&camera(), &period, DurationKind::Daily).unwrap();
    assert_eq!(quote.duration, 2);
    assert_eq!(quote.subtotal, Money::from_major(2000));
    assert_eq!(quote.deposit, Money::from_major(500));

    let order_a = h
        .lifecycle
        .confirm_order(camera_request(2, at(1), at(3)))
        .await
        .unwrap();
    assert_eq!(order_a.status, OrderStatus::Confirmed);
    assert_eq!(order_a.lines[0].unit_price, Money::from_major(1000));
    assert_eq!(order_a.lines[0].subtotal, Money::from_major(2000));
    assert_eq!(order_a.total_amount, Money::from_major(2000));
    assert_eq!(order_a.deposit_paid, Money::from_major(500));
    assert_eq!(order_a.return_date, at(3));

    let reservations = h.store.reservations_for_order(&order_a.id).await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].status, ReservationStatus::Active);
    assert_eq!(reservations[0].quantity_reserved, 2);

    let invoice = h.store.invoice_for_order(&order_a.id).await.unwrap().unwrap();
    assert_eq!(invoice.subtotal, Money::from_major(2000));
    assert_eq!(invoice.tax_amount, Money::from_major(360));
    assert_eq!(invoice.total, Money::from_major(2860));

    let rejected = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap_err();
    assert_eq!(rejected.kind(), ErrorKind::Availability);
    assert!(rejected.is_business_outcome());

    let picked_up = h
        .lifecycle
        .mark_picked_up(&order_a.id, &vendor())
        .await
        .unwrap();
    assert_eq!(picked_up.status, OrderStatus::WithCustomer);
    assert!(picked_up.pickup_date.is_some());

    let returned = h
        .lifecycle
        .mark_returned(&order_a.id, &vendor(), Some(at(5)), None)
        .await
        .unwrap();
    assert_eq!(returned.status, OrderStatus::Returned);
    assert_eq!(returned.late_fee, Money::from_major(200));
    assert_eq!(returned.actual_return_date, Some(at(5)));
    assert_eq!(returned.amount_due(), Money::from_major(2200));
    assert_eq!(
        h.store.reservations_for_order(&order_a.id).await.unwrap()[0].status,
        ReservationStatus::Completed
    );

    let order_b = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap();
    assert_eq!(order_b.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_lines_are_checked_in_submission_order() {
    let h = harness();
    h.lifecycle
        .confirm_order(camera_request(2, at(1), at(3)))
        .await
        .unwrap();

    let mut request = camera_request(1, at(1), at(3));
    let mut unknown = request.lines[0].clone();
    unknown.product_id = ProductId::new("drone");
    request.lines.push(unknown);

    match h.lifecycle.confirm_order(request.clone()).await {
        Err(RentalError::InsufficientAvailability { line, .. }) => assert_eq!(line, 0),
        other => panic!("expected line 0 to be short, got {other:?}"),
    }

    request.lines.swap(0, 1);
    assert!(matches!(
        h.lifecycle.confirm_order(request).await,
        Err(RentalError::ProductNotFound { .. })
    ));

    let mut free_then_unknown = camera_request(1, at(5), at(6));
    let mut unknown = free_then_unknown.lines[0].clone();
    unknown.product_id = ProductId::new("drone");
    free_then_unknown.lines.push(unknown);
    assert!(matches!(
        h.lifecycle.confirm_order(free_then_unknown).await,
        Err(RentalError::ProductNotFound { .. })
    ));
    assert_eq!(h.store.all_reservations().await.len(), 1);
}

#[tokio::test]
async fn test_on_time_and_early_returns_carry_no_fee() {
    let h = harness();

    for returned_at in [at(3), at(2)] {
        let order = h
            .lifecycle
            .confirm_order(camera_request(1, at(1), at(3)))
            .await
            .unwrap();
        h.lifecycle
            .mark_picked_up(&order.id, &vendor())
            .await
            .unwrap();
        let returned = h
            .lifecycle
            .mark_returned(&order.id, &vendor(), Some(returned_at), None)
            .await
            .unwrap();
        assert_eq!(returned.late_fee, Money::zero());
    }
}

#[tokio::test]
async fn test_illegal_transitions_leave_order_and_reservations_untouched() {
    let h = harness();
    let order = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap();

    let early_return = h
        .lifecycle
        .mark_returned(&order.id, &vendor(), Some(at(3)), None)
        .await;
    assert!(matches!(
        early_return,
        Err(RentalError::InvalidStateTransition { .. })
    ));
    assert_eq!(h.lifecycle.get_order(&order.id).await.unwrap(), order);

    let with_customer = h
        .lifecycle
        .mark_picked_up(&order.id, &vendor())
        .await
        .unwrap();
    let reservations_before = h.store.reservations_for_order(&order.id).await.unwrap();

    let cancel = h.lifecycle.cancel_order(&order.id, &vendor()).await;
    assert_eq!(cancel.unwrap_err().kind(), ErrorKind::InvalidState);

    let second_pickup = h.lifecycle.mark_picked_up(&order.id, &vendor()).await;
    assert_eq!(second_pickup.unwrap_err().kind(), ErrorKind::InvalidState);

    assert_eq!(h.lifecycle.get_order(&order.id).await.unwrap(), with_customer);
    assert_eq!(
        h.store.reservations_for_order(&order.id).await.unwrap(),
        reservations_before
    );

    h.lifecycle
        .mark_returned(&order.id, &vendor(), Some(at(3)), None)
        .await
        .unwrap();
    for attempt in [
        h.lifecycle.cancel_order(&order.id, &vendor()).await,
        h.lifecycle.mark_picked_up(&order.id, &vendor()).await,
        h.lifecycle
            .mark_returned(&order.id, &vendor(), None, None)
            .await,
    ] {
        assert_eq!(attempt.unwrap_err().kind(), ErrorKind::InvalidState);
    }
}

#[tokio::test]
async fn test_cancellation_frees_capacity() {
    let h = harness();

    let first = h
        .lifecycle
        .confirm_order(camera_request(2, at(10), at(12)))
        .await
        .unwrap();

    let blocked = h
        .lifecycle
        .confirm_order(camera_request(2, at(11), at(13)))
        .await;
    assert!(matches!(
        blocked,
        Err(RentalError::InsufficientAvailability {
            line: 0,
            requested: 2,
            available: 0,
            ..
        })
    ));

    let cancelled = h
        .lifecycle
        .cancel_order(&first.id, &customer())
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(
        h.store.reservations_for_order(&first.id).await.unwrap()[0].status,
        ReservationStatus::Cancelled
    );

    let period = RentalPeriod::new(at(11), at(13)).unwrap();
    let advisory = h
        .lifecycle
        .check_availability(&ProductId::new("camera"), None, 2, &period)
        .await
        .unwrap();
    assert!(advisory.available);
    assert_eq!(advisory.reserved_quantity, 0);

    h.lifecycle
        .confirm_order(camera_request(2, at(11), at(13)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_back_to_back_rentals_do_not_conflict() {
    let h = harness();
    h.lifecycle
        .confirm_order(camera_request(2, at(1), at(3)))
        .await
        .unwrap();
    h.lifecycle
        .confirm_order(camera_request(2, at(3), at(5)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invoice_failure_rolls_back_confirmation() {
    let failing = harness_with(Arc::new(FailingInvoices), Arc::new(MockSink::new()));

    let result = failing
        .lifecycle
        .confirm_order(camera_request(2, at(1), at(3)))
        .await;
    assert!(matches!(result, Err(RentalError::Configuration(_))));
    assert!(failing.store.all_reservations().await.is_empty());

    let period = RentalPeriod::new(at(1), at(3)).unwrap();
    let availability = failing
        .lifecycle
        .check_availability(&ProductId::new("camera"), None, 2, &period)
        .await
        .unwrap();
    assert!(availability.available);
}

#[test_log::test(tokio::test)]
async fn test_notification_failure_does_not_undo_transition() {
    let mut sink = MockSink::new();
    sink.expect_notify()
        .times(3)
        .returning(|_| Err(RentalError::Notification("mail relay down".to_string())));

    let h = harness_with(Arc::new(GstInvoiceGenerator), Arc::new(sink));

    let order = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap();
    assert_eq!(
        h.lifecycle.get_order(&order.id).await.unwrap().status,
        OrderStatus::Confirmed
    );

    let picked_up = h
        .lifecycle
        .mark_picked_up(&order.id, &vendor())
        .await
        .unwrap();
    assert_eq!(picked_up.status, OrderStatus::WithCustomer);
}

#[tokio::test]
async fn test_notifications_follow_commits_only() {
    let (sink, mut queue) = QueuedNotificationSink::new(16);
    let h = harness_with(Arc::new(GstInvoiceGenerator), Arc::new(sink));

    let order = h
        .lifecycle
        .confirm_order(camera_request(2, at(1), at(3)))
        .await
        .unwrap();
    let rejected = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await;
    assert!(rejected.is_err());
    h.lifecycle
        .cancel_order(&order.id, &customer())
        .await
        .unwrap();

    let mut delivered = Vec::new();
    while let Ok(notification) = queue.try_recv() {
        delivered.push((notification.user_id, notification.kind));
    }
    assert_eq!(
        delivered,
        vec![
            (customer(), NotificationKind::OrderConfirmed),
            (vendor(), NotificationKind::OrderConfirmed),
            (vendor(), NotificationKind::OrderCancelled),
        ]
    );
}

#[tokio::test]
async fn test_only_parties_may_transition_orders() {
    let h = harness();
    let stranger = UserId::new("someone-else");
    let order = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap();

    let by_customer = h.lifecycle.mark_picked_up(&order.id, &customer()).await;
    assert!(matches!(by_customer, Err(RentalError::Unauthorized { .. })));

    let by_stranger = h.lifecycle.cancel_order(&order.id, &stranger).await;
    assert_eq!(by_stranger.unwrap_err().kind(), ErrorKind::Authorization);
    assert_eq!(h.lifecycle.get_order(&order.id).await.unwrap(), order);

    let trusted = harness().lifecycle.with_access_policy(Arc::new(TrustedCallerPolicy));
    let order = trusted
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap();
    let picked_up = trusted.mark_picked_up(&order.id, &stranger).await.unwrap();
    assert_eq!(picked_up.status, OrderStatus::WithCustomer);
}

#[tokio::test]
async fn test_confirm_rejects_malformed_requests() {
    let h = harness();

    let mut empty = camera_request(1, at(1), at(3));
    empty.lines.clear();
    assert_eq!(
        h.lifecycle.confirm_order(empty).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    let inverted = camera_request(1, at(3), at(1));
    assert_eq!(
        h.lifecycle.confirm_order(inverted).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    let zero = camera_request(0, at(1), at(3));
    assert_eq!(
        h.lifecycle.confirm_order(zero).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    let mut unpriced = camera();
    unpriced.rental_pricing = None;
    h.catalog.upsert(unpriced).await;
    let err = h
        .lifecycle
        .confirm_order(camera_request(1, at(1), at(3)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!err.is_business_outcome());
}
