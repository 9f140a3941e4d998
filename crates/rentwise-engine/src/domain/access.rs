use crate::domain::orders::RentalOrder;
use crate::domain::types::UserId;
use crate::error::{RentalError, Result};
use std::fmt;

/// Order transitions that are subject to an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    PickUp,
    Return,
    Cancel,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::PickUp => write!(f, "pick up"),
            OrderAction::Return => write!(f, "return"),
            OrderAction::Cancel => write!(f, "cancel"),
        }
    }
}

/// Decides whether an actor may apply an action to an order.
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, actor: &UserId, action: OrderAction, order: &RentalOrder) -> Result<()>;
}

/// The vendor handles the physical hand-over; either party may cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartyAccessPolicy;

impl AccessPolicy for PartyAccessPolicy {
    fn authorize(&self, actor: &UserId, action: OrderAction, order: &RentalOrder) -> Result<()> {
        let is_vendor = actor == &order.vendor_id;
        let is_customer = actor == &order.customer_id;

        let permitted = match action {
            OrderAction::PickUp | OrderAction::Return => is_vendor,
            OrderAction::Cancel => is_vendor || is_customer,
        };

        if permitted {
            Ok(())
        } else {
            Err(RentalError::Unauthorized {
                actor_id: actor.to_string(),
                action: action.to_string(),
                order_id: order.id.to_string(),
            })
        }
    }
}

/// For callers already authorized by an upstream auth layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedCallerPolicy;

impl AccessPolicy for TrustedCallerPolicy {
    fn authorize(&self, _actor: &UserId, _action: OrderAction, _order: &RentalOrder) -> Result<()> {
        Ok(())
    }
}
