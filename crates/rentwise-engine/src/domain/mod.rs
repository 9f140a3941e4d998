pub mod access;
pub mod availability;
pub mod invoices;
pub mod lifecycle;
pub mod notifications;
pub mod orders;
pub mod pricing;
pub mod products;
pub mod reservations;
pub mod types;

pub use access::{AccessPolicy, OrderAction, PartyAccessPolicy, TrustedCallerPolicy};
pub use availability::{AvailabilityResult, AvailabilityService};
pub use invoices::{GstInvoiceGenerator, Invoice, InvoiceGenerator, InvoiceLine};
pub use lifecycle::OrderLifecycle;
pub use notifications::{
    Notification, NotificationKind, NotificationSink, QueuedNotificationSink,
    TracingNotificationSink,
};
pub use orders::{ConfirmOrderRequest, OrderLine, OrderLineRequest, RentalOrder};
pub use pricing::{PriceQuote, PricingEngine};
pub use products::{CustomTier, Product, ProductVariant, RentalPricing};
pub use reservations::Reservation;
pub use types::{
    DurationKind, InventoryKey, InvoiceId, Money, OrderId, OrderStatus, PaymentStatus, ProductId,
    RentalPeriod, ReservationId, ReservationStatus, UserId, VariantId,
};
