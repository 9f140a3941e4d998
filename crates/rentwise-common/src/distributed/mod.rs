#[cfg(feature = "postgres")]
pub mod postgres_lock;

#[cfg(feature = "postgres")]
pub use postgres_lock::{lock_for_transaction, AdvisoryLock, AdvisoryLockGuard, LockError};

mod lock_key;

pub use lock_key::LockKey;
