pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use config::{RentalConfig, RentalSettings};
pub use error::{ErrorKind, RentalError, Result};
