//! Order state machine.
//!
//! Every transition runs inside one [`UnitOfWork`]: the order row, its
//! reservations and (on confirm) the invoice change together or not at all.
//! Confirmation takes the inventory locks of every line in sorted key order,
//! then resolves, prices and checks each line in the order submitted. Two
//! confirmations that compete for the same stock are serialized and the second
//! sees the first's reservations.

use crate::config::RentalSettings;
use crate::domain::access::{AccessPolicy, OrderAction, PartyAccessPolicy};
use crate::domain::availability::{reserved_quantity, AvailabilityResult, AvailabilityService};
use crate::domain::invoices::InvoiceGenerator;
use crate::domain::notifications::{Notification, NotificationKind, NotificationSink};
use crate::domain::orders::{ConfirmOrderRequest, OrderLine, OrderLineRequest, RentalOrder};
use crate::domain::pricing::PricingEngine;
use crate::domain::reservations::Reservation;
use crate::domain::types::{
    intervals_overlap, InventoryKey, OrderId, ProductId, RentalPeriod, ReservationStatus, UserId,
    VariantId,
};
use crate::error::{RentalError, Result};
use crate::storage::{ProductCatalog, ReservationStore, UnitOfWork};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OrderLifecycle {
    catalog: Arc<dyn ProductCatalog>,
    store: Arc<dyn ReservationStore>,
    invoices: Arc<dyn InvoiceGenerator>,
    notifications: Arc<dyn NotificationSink>,
    access: Arc<dyn AccessPolicy>,
    availability: AvailabilityService,
    settings: RentalSettings,
}

impl OrderLifecycle {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        store: Arc<dyn ReservationStore>,
        invoices: Arc<dyn InvoiceGenerator>,
        notifications: Arc<dyn NotificationSink>,
        settings: RentalSettings,
    ) -> Self {
        let availability = AvailabilityService::new(catalog.clone(), store.clone());
        Self {
            catalog,
            store,
            invoices,
            notifications,
            access: Arc::new(PartyAccessPolicy),
            availability,
            settings,
        }
    }

    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    pub fn settings(&self) -> &RentalSettings {
        &self.settings
    }

    /// Advisory check outside any unit of work.
    pub async fn check_availability(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: u32,
        period: &RentalPeriod,
    ) -> Result<AvailabilityResult> {
        self.availability
            .check_availability(product_id, variant_id, quantity, period)
            .await
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<RentalOrder> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| RentalError::OrderNotFound {
                id: order_id.to_string(),
            })
    }

    pub async fn confirm_order(&self, request: ConfirmOrderRequest) -> Result<RentalOrder> {
        request.validate()?;
        let keys: BTreeSet<InventoryKey> =
            request.lines.iter().map(OrderLineRequest::key).collect();

        let mut uow = self.store.begin().await?;
        for key in &keys {
            uow.lock_inventory(key).await?;
        }

        let mut lines = Vec::with_capacity(request.lines.len());
        for (index, requested) in request.lines.iter().enumerate() {
            let line = self
                .claim_line(uow.as_mut(), &request.vendor_id, index, requested, &lines)
                .await?;
            lines.push(line);
        }

        let order = RentalOrder::confirmed(
            request.customer_id,
            request.vendor_id,
            lines,
            request.payment_status,
        )?;

        uow.insert_order(&order).await?;
        for line in &order.lines {
            let reservation =
                Reservation::new(line.key(), order.id, line.quantity, line.period()?)?;
            uow.insert_reservation(&reservation).await?;
            debug!(
                order_id = %order.id,
                reservation_id = %reservation.id,
                "Reserved {} unit(s) of {} from {} to {}",
                line.quantity,
                reservation.key(),
                line.start_date.to_rfc3339(),
                line.end_date.to_rfc3339()
            );
        }

        let invoice = self
            .invoices
            .create_invoice_from_order(&order, self.settings.gst_rate)?;
        uow.insert_invoice(&invoice).await?;
        uow.commit().await?;

        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            lines = order.lines.len(),
            total = %order.total_amount,
            "Order confirmed"
        );

        let message = format!(
            "Your rental order {} is confirmed. Total {}, deposit {}.",
            order.id, order.total_amount, order.deposit_paid
        );
        self.dispatch(vec![
            Notification::new(
                order.customer_id.clone(),
                NotificationKind::OrderConfirmed,
                order.id,
                "Order confirmed",
                message,
            ),
            Notification::new(
                order.vendor_id.clone(),
                NotificationKind::OrderConfirmed,
                order.id,
                "New rental order",
                format!("Order {} has been confirmed by a customer.", order.id),
            ),
        ])
        .await;

        Ok(order)
    }

    pub async fn mark_picked_up(&self, order_id: &OrderId, actor: &UserId) -> Result<RentalOrder> {
        let mut uow = self.store.begin().await?;
        let mut order = self
            .load_for_transition(uow.as_mut(), order_id, actor, OrderAction::PickUp)
            .await?;

        if let Err(e) = order.mark_picked_up(Utc::now()) {
            warn!(order_id = %order_id, "Pickup rejected: {}", e);
            return Err(e);
        }
        uow.update_order(&order).await?;
        uow.commit().await?;

        info!(order_id = %order.id, actor = %actor, "Order picked up");
        self.dispatch(vec![Notification::new(
            order.customer_id.clone(),
            NotificationKind::OrderPickedUp,
            order.id,
            "Order picked up",
            format!(
                "Order {} is with you. Please return it by {}.",
                order.id,
                order.return_date.to_rfc3339()
            ),
        )])
        .await;

        Ok(order)
    }

    /// Return an order, charging the configured late fee for every started day
    /// past the expected return date.
    pub async fn mark_returned(
        &self,
        order_id: &OrderId,
        actor: &UserId,
        actual_return_date: Option<DateTime<Utc>>,
        condition_notes: Option<String>,
    ) -> Result<RentalOrder> {
        let returned_at = actual_return_date.unwrap_or_else(Utc::now);

        let mut uow = self.store.begin().await?;
        let mut order = self
            .load_for_transition(uow.as_mut(), order_id, actor, OrderAction::Return)
            .await?;

        let late_fee = PricingEngine::late_fee_between(
            order.return_date,
            returned_at,
            self.settings.late_fee_per_day,
        );
        if let Err(e) = order.mark_returned(returned_at, late_fee, condition_notes) {
            warn!(order_id = %order_id, "Return rejected: {}", e);
            return Err(e);
        }
        uow.update_order(&order).await?;
        let completed = uow
            .update_reservation_status(
                &order.id,
                ReservationStatus::Active,
                ReservationStatus::Completed,
            )
            .await?;
        uow.commit().await?;

        info!(
            order_id = %order.id,
            actor = %actor,
            late_fee = %order.late_fee,
            reservations = completed,
            "Order returned"
        );
        self.dispatch(vec![Notification::new(
            order.customer_id.clone(),
            NotificationKind::OrderReturned,
            order.id,
            "Order returned",
            format!(
                "Order {} has been returned. Late fee: {}.",
                order.id, order.late_fee
            ),
        )])
        .await;

        Ok(order)
    }

    pub async fn cancel_order(&self, order_id: &OrderId, actor: &UserId) -> Result<RentalOrder> {
        let mut uow = self.store.begin().await?;
        let mut order = self
            .load_for_transition(uow.as_mut(), order_id, actor, OrderAction::Cancel)
            .await?;

        if let Err(e) = order.cancel() {
            warn!(order_id = %order_id, "Cancellation rejected: {}", e);
            return Err(e);
        }
        uow.update_order(&order).await?;
        let released = uow
            .update_reservation_status(
                &order.id,
                ReservationStatus::Active,
                ReservationStatus::Cancelled,
            )
            .await?;
        uow.commit().await?;

        info!(
            order_id = %order.id,
            actor = %actor,
            reservations = released,
            "Order cancelled"
        );

        let counterpart = if actor == &order.customer_id {
            order.vendor_id.clone()
        } else {
            order.customer_id.clone()
        };
        self.dispatch(vec![Notification::new(
            counterpart,
            NotificationKind::OrderCancelled,
            order.id,
            "Order cancelled",
            format!("Order {} has been cancelled.", order.id),
        )])
        .await;

        Ok(order)
    }

    /// Resolve, price and check one line against committed reservations and
    /// the lines of this order accepted before it.
    async fn claim_line(
        &self,
        uow: &mut dyn UnitOfWork,
        vendor_id: &UserId,
        index: usize,
        requested: &OrderLineRequest,
        earlier: &[OrderLine],
    ) -> Result<OrderLine> {
        let product = self
            .catalog
            .get_product(&requested.product_id)
            .await?
            .ok_or_else(|| RentalError::ProductNotFound {
                id: requested.product_id.to_string(),
            })?;

        if &product.vendor_id != vendor_id {
            return Err(RentalError::validation(
                "vendor_id",
                format!(
                    "line {index}: product {} is not offered by vendor {}",
                    product.id, vendor_id
                ),
            ));
        }

        let total_quantity = product.total_quantity(requested.variant_id.as_ref())?;
        let key = requested.key();
        let period = requested.period()?;
        let quote = PricingEngine::price(&product, &period, requested.duration_kind)?;

        let active = uow.active_reservations(&key, &period).await?;
        let pending = earlier
            .iter()
            .filter(|line| {
                line.key() == key
                    && intervals_overlap(
                        line.start_date,
                        line.end_date,
                        period.start(),
                        period.end(),
                    )
            })
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity));
        let result = AvailabilityResult::assess(
            total_quantity,
            reserved_quantity(&active, &key, &period).saturating_add(pending),
            requested.quantity,
        );

        if !result.available {
            warn!(
                line = index,
                inventory = %key,
                requested = requested.quantity,
                available = result.available_quantity,
                "Confirmation rejected: insufficient availability"
            );
            return Err(RentalError::InsufficientAvailability {
                line: index,
                product_id: requested.product_id.to_string(),
                variant_id: requested.variant_id.as_ref().map(|v| v.to_string()),
                requested: requested.quantity,
                available: result.available_quantity,
            });
        }

        Ok(OrderLine::priced(requested, &quote))
    }

    async fn load_for_transition(
        &self,
        uow: &mut dyn UnitOfWork,
        order_id: &OrderId,
        actor: &UserId,
        action: OrderAction,
    ) -> Result<RentalOrder> {
        let order = uow
            .get_order_for_update(order_id)
            .await?
            .ok_or_else(|| RentalError::OrderNotFound {
                id: order_id.to_string(),
            })?;

        if let Err(e) = self.access.authorize(actor, action, &order) {
            warn!(order_id = %order_id, actor = %actor, "Authorization failed: {}", e);
            return Err(e);
        }
        Ok(order)
    }

    /// Deliver after commit. Failures are logged and never surface to the caller.
    async fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let kind = notification.kind;
            let user_id = notification.user_id.clone();
            if let Err(e) = self.notifications.notify(notification).await {
                warn!(
                    user_id = %user_id,
                    kind = %kind,
                    "Notification delivery failed: {}",
                    e
                );
            }
        }
    }
}
