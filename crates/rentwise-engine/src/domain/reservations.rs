use crate::domain::types::{
    intervals_overlap, InventoryKey, OrderId, ProductId, RentalPeriod, ReservationId,
    ReservationStatus, VariantId,
};
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed claim on units of a product or variant for an interval.
///
/// Reservations are never deleted; returning or cancelling the owning order moves
/// them out of `Active`, which is the only status that consumes capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub order_id: OrderId,
    pub quantity_reserved: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        key: InventoryKey,
        order_id: OrderId,
        quantity_reserved: u32,
        period: RentalPeriod,
    ) -> Result<Self> {
        if quantity_reserved == 0 {
            return Err(RentalError::validation(
                "quantity",
                "reserved quantity must be positive",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: ReservationId::new(),
            product_id: key.product_id,
            variant_id: key.variant_id,
            order_id,
            quantity_reserved,
            start_date: period.start(),
            end_date: period.end(),
            status: ReservationStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn period(&self) -> Result<RentalPeriod> {
        RentalPeriod::new(self.start_date, self.end_date)
    }

    /// Whether this reservation consumes capacity of `key` anywhere in `period`.
    pub fn claims(&self, key: &InventoryKey, period: &RentalPeriod) -> bool {
        self.is_active()
            && self.product_id == key.product_id
            && self.variant_id == key.variant_id
            && intervals_overlap(self.start_date, self.end_date, period.start(), period.end())
    }

    pub fn transition_to(&mut self, next: ReservationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RentalError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
