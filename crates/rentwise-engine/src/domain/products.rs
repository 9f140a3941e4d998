use crate::domain::types::{DurationKind, Money, ProductId, UserId, VariantId};
use crate::error::{RentalError, Result};
use serde::{Deserialize, Serialize};

/// A rentable product as seen by the reservation engine.
///
/// Products are owned by the catalog service; this subsystem only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub vendor_id: UserId,
    pub name: String,
    /// Units of the base product (used when no variant is named)
    pub quantity_on_hand: u32,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    pub rental_pricing: Option<RentalPricing>,
    pub security_deposit: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub name: String,
    pub quantity: u32,
}

/// Unit prices per duration tier. A `None` tier is not offered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RentalPricing {
    pub hourly: Option<Money>,
    pub daily: Option<Money>,
    pub weekly: Option<Money>,
    pub custom: Option<CustomTier>,
}

/// Vendor-defined billing period, e.g. a monthly rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTier {
    pub price: Option<Money>,
    pub period_days: Option<u32>,
}

impl RentalPricing {
    pub fn unit_price(&self, kind: DurationKind) -> Option<Money> {
        match kind {
            DurationKind::Hourly => self.hourly,
            DurationKind::Daily => self.daily,
            DurationKind::Weekly => self.weekly,
            DurationKind::Custom => self.custom.as_ref().and_then(|tier| tier.price),
        }
    }
}

impl Product {
    pub fn variant(&self, variant_id: &VariantId) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| &v.id == variant_id)
    }

    /// Total units of the base product or of the named variant.
    pub fn total_quantity(&self, variant_id: Option<&VariantId>) -> Result<u32> {
        match variant_id {
            None => Ok(self.quantity_on_hand),
            Some(variant_id) => self
                .variant(variant_id)
                .map(|v| v.quantity)
                .ok_or_else(|| RentalError::VariantNotFound {
                    product_id: self.id.to_string(),
                    variant_id: variant_id.to_string(),
                }),
        }
    }

    pub fn deposit(&self) -> Money {
        self.security_deposit.unwrap_or_else(Money::zero)
    }
}
