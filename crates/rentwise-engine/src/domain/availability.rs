use crate::domain::reservations::Reservation;
use crate::domain::types::{InventoryKey, ProductId, RentalPeriod, VariantId};
use crate::error::{RentalError, Result};
use crate::storage::{ProductCatalog, ReservationStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub available: bool,
    pub available_quantity: u32,
    pub total_quantity: u32,
    pub reserved_quantity: u32,
}

impl AvailabilityResult {
    pub fn assess(total_quantity: u32, reserved_quantity: u32, requested: u32) -> Self {
        let available_quantity = total_quantity.saturating_sub(reserved_quantity);
        Self {
            available: available_quantity >= requested,
            available_quantity,
            total_quantity,
            reserved_quantity,
        }
    }
}

/// Units of `key` held by active reservations overlapping `period`.
pub fn reserved_quantity(
    reservations: &[Reservation],
    key: &InventoryKey,
    period: &RentalPeriod,
) -> u32 {
    reservations
        .iter()
        .filter(|r| r.claims(key, period))
        .fold(0u32, |acc, r| acc.saturating_add(r.quantity_reserved))
}

/// Read-only availability checks.
///
/// Results are advisory: confirmation repeats the check inside its unit of work
/// while holding the inventory lock.
#[derive(Clone)]
pub struct AvailabilityService {
    catalog: Arc<dyn ProductCatalog>,
    store: Arc<dyn ReservationStore>,
}

impl AvailabilityService {
    pub fn new(catalog: Arc<dyn ProductCatalog>, store: Arc<dyn ReservationStore>) -> Self {
        Self { catalog, store }
    }

    pub async fn check_availability(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: u32,
        period: &RentalPeriod,
    ) -> Result<AvailabilityResult> {
        if quantity == 0 {
            return Err(RentalError::validation(
                "quantity",
                "requested quantity must be positive",
            ));
        }

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| RentalError::ProductNotFound {
                id: product_id.to_string(),
            })?;
        let total_quantity = product.total_quantity(variant_id)?;

        let key = InventoryKey::new(product_id.clone(), variant_id.cloned());
        let reservations = self.store.active_reservations(&key, period).await?;
        let result = AvailabilityResult::assess(
            total_quantity,
            reserved_quantity(&reservations, &key, period),
            quantity,
        );

        debug!(
            "Availability of {} over {}: {}/{} free, {} requested",
            key, period, result.available_quantity, result.total_quantity, quantity
        );
        Ok(result)
    }
}
