use crate::error::{RentalError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

string_id!(
    /// Catalog product identifier (owned by the external catalog service)
    ProductId
);
string_id!(
    /// Identifier of a product variant, unique within its product
    VariantId
);
string_id!(
    /// Customer or vendor identifier (from the auth service)
    UserId
);
uuid_id!(OrderId);
uuid_id!(ReservationId);
uuid_id!(InvoiceId);

/// Monetary amount rounded to two decimal places
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_decimal(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// `None` when the result does not fit in a `Decimal`.
    pub fn checked_times(&self, count: u32) -> Option<Self> {
        self.0.checked_mul(Decimal::from(count)).map(Self::from_decimal)
    }

    pub fn saturating_times(&self, count: u32) -> Self {
        Self::from_decimal(self.0.saturating_mul(Decimal::from(count)))
    }

    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Self::from_decimal)
    }

    /// `rate` is a percentage, e.g. `18` for 18%.
    pub fn checked_percentage(&self, rate: Decimal) -> Option<Self> {
        self.0
            .checked_mul(rate)
            .map(|scaled| Self::from_decimal(scaled / Decimal::ONE_HUNDRED))
    }

    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }
}

/// Saturates at the `Decimal` bounds. Amounts built from catalog prices go
/// through the `checked_*` methods instead.
impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money::from_decimal(self.0.saturating_add(other.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pricing tier governing how a rental interval is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationKind {
    Hourly,
    Daily,
    Weekly,
    Custom,
}

impl fmt::Display for DurationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationKind::Hourly => write!(f, "hourly"),
            DurationKind::Daily => write!(f, "daily"),
            DurationKind::Weekly => write!(f, "weekly"),
            DurationKind::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for DurationKind {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hourly" => Ok(DurationKind::Hourly),
            "daily" => Ok(DurationKind::Daily),
            "weekly" => Ok(DurationKind::Weekly),
            "custom" => Ok(DurationKind::Custom),
            other => Err(RentalError::validation(
                "duration_kind",
                format!("unknown duration kind '{other}'"),
            )),
        }
    }
}

/// Rental order lifecycle states.
///
/// Pickup is not a state of its own: it is recorded as `pickup_date` on
/// `WithCustomer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
    WithCustomer,
    Returned,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Returned | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Confirmed, OrderStatus::WithCustomer)
                | (OrderStatus::Confirmed, OrderStatus::Cancelled)
                | (OrderStatus::WithCustomer, OrderStatus::Returned)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Confirmed => write!(f, "confirmed"),
            OrderStatus::WithCustomer => write!(f, "with_customer"),
            OrderStatus::Returned => write!(f, "returned"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "confirmed" => Ok(OrderStatus::Confirmed),
            "with_customer" => Ok(OrderStatus::WithCustomer),
            "returned" => Ok(OrderStatus::Returned),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(RentalError::validation(
                "status",
                format!("unknown order status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Active, ReservationStatus::Completed)
                | (ReservationStatus::Active, ReservationStatus::Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Active => write!(f, "active"),
            ReservationStatus::Completed => write!(f, "completed"),
            ReservationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "completed" => Ok(ReservationStatus::Completed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(RentalError::validation(
                "status",
                format!("unknown reservation status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(RentalError::validation(
                "payment_status",
                format!("unknown payment status '{other}'"),
            )),
        }
    }
}

/// `[s1, e1]` and `[s2, e2]` overlap iff `s1 < e2 && s2 < e1`.
///
/// Touching intervals (`e1 == s2`) do not overlap, so back-to-back rentals of the
/// same unit are allowed.
pub fn intervals_overlap<T: PartialOrd>(s1: T, e1: T, s2: T, e2: T) -> bool {
    s1 < e2 && s2 < e1
}

/// A rental interval with `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl RentalPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(RentalError::validation(
                "end_date",
                format!("end {end} must be after start {start}"),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &RentalPeriod) -> bool {
        intervals_overlap(self.start, self.end, other.start, other.end)
    }

    /// Half-open containment: `start <= instant < end`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl fmt::Display for RentalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// The unit of inventory a reservation draws from: a product's base stock or one
/// of its variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InventoryKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl InventoryKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant) => write!(f, "{}/{}", self.product_id, variant),
            None => write!(f, "{}", self.product_id),
        }
    }
}
