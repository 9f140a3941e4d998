//! Shared infrastructure for Rentwise crates: logging setup and PostgreSQL advisory locks.

pub mod distributed;
pub mod logging;
