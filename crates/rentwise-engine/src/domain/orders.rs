use crate::domain::pricing::PriceQuote;
use crate::domain::types::{
    DurationKind, InventoryKey, Money, OrderId, OrderStatus, PaymentStatus, ProductId,
    RentalPeriod, UserId, VariantId,
};
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One requested line of a confirmation, before pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_kind: DurationKind,
}

impl OrderLineRequest {
    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    pub fn period(&self) -> Result<RentalPeriod> {
        RentalPeriod::new(self.start_date, self.end_date)
    }
}

/// Input of the confirm transition (a validated quotation or a direct line list)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmOrderRequest {
    pub customer_id: UserId,
    pub vendor_id: UserId,
    pub lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
}

impl ConfirmOrderRequest {
    /// Shape checks that need no catalog or store access.
    pub fn validate(&self) -> Result<()> {
        if self.lines.is_empty() {
            return Err(RentalError::validation(
                "lines",
                "an order needs at least one line",
            ));
        }

        for (index, line) in self.lines.iter().enumerate() {
            if line.quantity == 0 {
                return Err(RentalError::validation(
                    "quantity",
                    format!("line {index} requests zero units"),
                ));
            }
            line.period().map_err(|_| {
                RentalError::validation(
                    "end_date",
                    format!("line {index} ends before it starts"),
                )
            })?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_kind: DurationKind,
    pub unit_price: Money,
    /// Billable tier units over the line's interval
    pub duration: u32,
    /// Rent for the line's interval as quoted, independent of `quantity`
    pub subtotal: Money,
    pub deposit: Money,
}

impl OrderLine {
    /// Price a requested line from the pricing engine's quote for its interval.
    pub fn priced(request: &OrderLineRequest, quote: &PriceQuote) -> Self {
        Self {
            product_id: request.product_id.clone(),
            variant_id: request.variant_id.clone(),
            quantity: request.quantity,
            start_date: request.start_date,
            end_date: request.end_date,
            duration_kind: request.duration_kind,
            unit_price: quote.unit_price,
            duration: quote.duration,
            subtotal: quote.subtotal,
            deposit: quote.deposit,
        }
    }

    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    pub fn period(&self) -> Result<RentalPeriod> {
        RentalPeriod::new(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalOrder {
    pub id: OrderId,
    pub customer_id: UserId,
    pub vendor_id: UserId,
    pub lines: Vec<OrderLine>,
    pub total_amount: Money,
    pub deposit_paid: Money,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub pickup_date: Option<DateTime<Utc>>,
    /// Expected return: the latest line end
    pub return_date: DateTime<Utc>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub late_fee: Money,
    pub return_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalOrder {
    pub fn confirmed(
        customer_id: UserId,
        vendor_id: UserId,
        lines: Vec<OrderLine>,
        payment_status: PaymentStatus,
    ) -> Result<Self> {
        let return_date = lines
            .iter()
            .map(|line| line.end_date)
            .max()
            .ok_or_else(|| RentalError::validation("lines", "an order needs at least one line"))?;
        let total_amount = checked_total(&lines, "total", |line| line.subtotal)?;
        let deposit_paid = checked_total(&lines, "deposit", |line| line.deposit)?;

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            customer_id,
            vendor_id,
            lines,
            total_amount,
            deposit_paid,
            payment_status,
            status: OrderStatus::Confirmed,
            pickup_date: None,
            return_date,
            actual_return_date: None,
            late_fee: Money::zero(),
            return_notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<()> {
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

    pub fn mark_picked_up(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition_to(OrderStatus::WithCustomer)?;
        self.pickup_date = Some(at);
        Ok(())
    }

    pub fn mark_returned(
        &mut self,
        at: DateTime<Utc>,
        late_fee: Money,
        notes: Option<String>,
    ) -> Result<()> {
        self.transition_to(OrderStatus::Returned)?;
        self.actual_return_date = Some(at);
        self.late_fee = late_fee;
        self.return_notes = notes;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition_to(OrderStatus::Cancelled)
    }

    /// Rent plus any late fee; the deposit is tracked separately.
    pub fn amount_due(&self) -> Money {
        self.total_amount + self.late_fee
    }
}

fn checked_total(
    lines: &[OrderLine],
    what: &str,
    amount: impl Fn(&OrderLine) -> Money,
) -> Result<Money> {
    lines.iter().try_fold(Money::zero(), |acc, line| {
        acc.checked_add(amount(line))
            .ok_or_else(|| RentalError::PricingNotConfigured {
                product_id: line.product_id.to_string(),
                reason: format!("order {what} overflows"),
            })
    })
}
