use rentwise_common::distributed::LockError;
use thiserror::Error;

/// Coarse classification of [`RentalError`], matching how callers must react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Availability,
    InvalidState,
    Configuration,
    Authorization,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum RentalError {
    #[error("Product not found: {id}")]
    ProductNotFound { id: String },

    #[error("Variant {variant_id} not found for product {product_id}")]
    VariantNotFound {
        product_id: String,
        variant_id: String,
    },

    #[error("Order not found: {id}")]
    OrderNotFound { id: String },

    #[error(
        "Insufficient availability for product {product_id} on line {line}: requested {requested}, available {available}"
    )]
    InsufficientAvailability {
        line: usize,
        product_id: String,
        variant_id: Option<String>,
        requested: u32,
        available: u32,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Pricing not configured for product {product_id}: {reason}")]
    PricingNotConfigured { product_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Actor {actor_id} is not permitted to {action} order {order_id}")]
    Unauthorized {
        actor_id: String,
        action: String,
        order_id: String,
    },

    #[error("Validation error on {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Database error during {operation}: {source}")]
    DatabaseError {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Notification delivery failed: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, RentalError>;

impl RentalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RentalError::ProductNotFound { .. }
            | RentalError::VariantNotFound { .. }
            | RentalError::OrderNotFound { .. } => ErrorKind::NotFound,
            RentalError::InsufficientAvailability { .. } => ErrorKind::Availability,
            RentalError::InvalidStateTransition { .. } => ErrorKind::InvalidState,
            RentalError::PricingNotConfigured { .. } | RentalError::Configuration(_) => {
                ErrorKind::Configuration
            }
            RentalError::Unauthorized { .. } => ErrorKind::Authorization,
            RentalError::ValidationError { .. } => ErrorKind::Validation,
            RentalError::DatabaseError { .. }
            | RentalError::Lock(_)
            | RentalError::Notification(_) => ErrorKind::Internal,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RentalError::ProductNotFound { .. } => "RENTWISE_PRODUCT_NOT_FOUND",
            RentalError::VariantNotFound { .. } => "RENTWISE_VARIANT_NOT_FOUND",
            RentalError::OrderNotFound { .. } => "RENTWISE_ORDER_NOT_FOUND",
            RentalError::InsufficientAvailability { .. } => "RENTWISE_INSUFFICIENT_AVAILABILITY",
            RentalError::InvalidStateTransition { .. } => "RENTWISE_INVALID_STATE",
            RentalError::PricingNotConfigured { .. } => "RENTWISE_PRICING_NOT_CONFIGURED",
            RentalError::Configuration(_) => "RENTWISE_CONFIG_ERROR",
            RentalError::Unauthorized { .. } => "RENTWISE_UNAUTHORIZED",
            RentalError::ValidationError { .. } => "RENTWISE_VALIDATION_ERROR",
            RentalError::DatabaseError { .. } => "RENTWISE_DATABASE_ERROR",
            RentalError::Lock(_) => "RENTWISE_LOCK_ERROR",
            RentalError::Notification(_) => "RENTWISE_NOTIFICATION_ERROR",
        }
    }

    /// Expected outcomes the caller can act on, as opposed to system failures.
    ///
    /// Configuration problems are excluded: they need a vendor or operator to fix
    /// data, not a customer to change the request.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::Availability
                | ErrorKind::InvalidState
                | ErrorKind::Authorization
                | ErrorKind::Validation
        )
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        RentalError::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn database(operation: &str, source: sqlx::Error) -> Self {
        RentalError::DatabaseError {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}
