use crate::domain::orders::RentalOrder;
use crate::domain::products::{Product, RentalPricing};
use crate::domain::types::{DurationKind, Money, RentalPeriod};
use crate::error::{RentalError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Billing period of the custom tier when the vendor did not set one
pub const DEFAULT_CUSTOM_PERIOD_DAYS: u32 = 30;

/// Price of renting one unit of a product over an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub duration_kind: DurationKind,
    pub unit_price: Money,
    /// Billable units of the tier (hours, days, weeks or custom periods)
    pub duration: u32,
    pub subtotal: Money,
    pub deposit: Money,
}

/// Stateless pricing rules.
pub struct PricingEngine;

impl PricingEngine {
    pub fn price(product: &Product, period: &RentalPeriod, kind: DurationKind) -> Result<PriceQuote> {
        let pricing =
            product
                .rental_pricing
                .as_ref()
                .ok_or_else(|| RentalError::PricingNotConfigured {
                    product_id: product.id.to_string(),
                    reason: "rental pricing is not configured".to_string(),
                })?;

        let unit_price =
            pricing
                .unit_price(kind)
                .ok_or_else(|| RentalError::PricingNotConfigured {
                    product_id: product.id.to_string(),
                    reason: format!("no {kind} price configured"),
                })?;

        if unit_price.is_negative() {
            return Err(RentalError::PricingNotConfigured {
                product_id: product.id.to_string(),
                reason: format!("{kind} price {unit_price} is negative"),
            });
        }

        let unit = Self::billing_unit(pricing, kind).map_err(|reason| {
            RentalError::PricingNotConfigured {
                product_id: product.id.to_string(),
                reason,
            }
        })?;
        let duration = Self::billable_units(period.length(), unit);
        let subtotal =
            unit_price
                .checked_times(duration)
                .ok_or_else(|| RentalError::PricingNotConfigured {
                    product_id: product.id.to_string(),
                    reason: format!("{kind} price {unit_price} overflows over {duration} units"),
                })?;

        Ok(PriceQuote {
            duration_kind: kind,
            unit_price,
            duration,
            subtotal,
            deposit: product.deposit(),
        })
    }

    fn billing_unit(pricing: &RentalPricing, kind: DurationKind) -> std::result::Result<Duration, String> {
        match kind {
            DurationKind::Hourly => Ok(Duration::hours(1)),
            DurationKind::Daily => Ok(Duration::days(1)),
            DurationKind::Weekly => Ok(Duration::weeks(1)),
            DurationKind::Custom => {
                let days = pricing
                    .custom
                    .as_ref()
                    .and_then(|tier| tier.period_days)
                    .unwrap_or(DEFAULT_CUSTOM_PERIOD_DAYS);
                if days == 0 {
                    return Err("custom period must be at least one day".to_string());
                }
                Ok(Duration::days(i64::from(days)))
            }
        }
    }

    /// Elapsed time in whole tier units, rounded up. Never less than one.
    pub fn billable_units(elapsed: Duration, unit: Duration) -> u32 {
        let elapsed_ms = elapsed.num_milliseconds();
        let unit_ms = unit.num_milliseconds();
        if elapsed_ms <= 0 || unit_ms <= 0 {
            return 1;
        }

        let mut units = elapsed_ms / unit_ms;
        if elapsed_ms % unit_ms != 0 {
            units += 1;
        }
        u32::try_from(units).unwrap_or(u32::MAX).max(1)
    }

    /// Late fee for an order, treating an unreturned order as returned now.
    pub fn late_fee(order: &RentalOrder, fee_per_day: Money) -> Money {
        let actual = order.actual_return_date.unwrap_or_else(Utc::now);
        Self::late_fee_between(order.return_date, actual, fee_per_day)
    }

    /// `ceil((actual - expected) / 1 day) * fee_per_day`, or zero when on time.
    pub fn late_fee_between(
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
        fee_per_day: Money,
    ) -> Money {
        if actual <= expected {
            return Money::zero();
        }
        let late_days = Self::billable_units(actual - expected, Duration::days(1));
        fee_per_day.saturating_times(late_days)
    }
}
