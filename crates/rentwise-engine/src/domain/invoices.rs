use crate::domain::orders::RentalOrder;
use crate::domain::types::{InvoiceId, Money, OrderId, ProductId, UserId, VariantId};
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Billing snapshot of a confirmed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub vendor_id: UserId,
    pub lines: Vec<InvoiceLine>,
    /// Tax rate as a percentage
    pub tax_rate: Decimal,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub deposit: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub unit_price: Money,
    pub duration: u32,
    pub subtotal: Money,
    pub tax: Money,
}

/// Derives an invoice from an order snapshot.
///
/// Called inside the confirmation unit of work; an error aborts the confirmation.
pub trait InvoiceGenerator: Send + Sync {
    fn create_invoice_from_order(&self, order: &RentalOrder, tax_rate: Decimal) -> Result<Invoice>;
}

/// Applies GST per line. Deposits are refundable and never taxed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstInvoiceGenerator;

impl InvoiceGenerator for GstInvoiceGenerator {
    fn create_invoice_from_order(&self, order: &RentalOrder, tax_rate: Decimal) -> Result<Invoice> {
        if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE_HUNDRED {
            return Err(RentalError::Configuration(format!(
                "tax rate {tax_rate} is outside 0..=100"
            )));
        }

        let overflow = || {
            RentalError::Configuration(format!(
                "invoice amounts for order {} exceed the representable range",
                order.id
            ))
        };

        let lines = order
            .lines
            .iter()
            .map(|line| {
                let tax = line.subtotal.checked_percentage(tax_rate).ok_or_else(overflow)?;
                Ok(InvoiceLine {
                    product_id: line.product_id.clone(),
                    variant_id: line.variant_id.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    duration: line.duration,
                    subtotal: line.subtotal,
                    tax,
                })
            })
            .collect::<Result<Vec<InvoiceLine>>>()?;

        let subtotal =
            Money::checked_sum(lines.iter().map(|line| line.subtotal)).ok_or_else(overflow)?;
        let tax_amount =
            Money::checked_sum(lines.iter().map(|line| line.tax)).ok_or_else(overflow)?;
        let total =
            Money::checked_sum([subtotal, tax_amount, order.deposit_paid]).ok_or_else(overflow)?;

        Ok(Invoice {
            id: InvoiceId::new(),
            order_id: order.id,
            customer_id: order.customer_id.clone(),
            vendor_id: order.vendor_id.clone(),
            lines,
            tax_rate,
            subtotal,
            tax_amount,
            deposit: order.deposit_paid,
            total,
            created_at: Utc::now(),
        })
    }
}
