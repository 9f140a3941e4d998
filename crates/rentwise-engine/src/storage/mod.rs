pub mod memory;
pub mod postgres;

pub use memory::{InMemoryProductCatalog, MemoryReservationStore};
pub use postgres::{PgReservationStore, SqlProductCatalog};

use crate::domain::invoices::Invoice;
use crate::domain::orders::RentalOrder;
use crate::domain::products::Product;
use crate::domain::reservations::Reservation;
use crate::domain::types::{InventoryKey, OrderId, ProductId, RentalPeriod, ReservationStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Read access to the external product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;
}

/// Durable orders, reservations and invoices.
///
/// All writes go through a [`UnitOfWork`]; the methods here are plain reads with
/// no isolation guarantees beyond a single query.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Active reservations of `key` whose interval overlaps `period`.
    async fn active_reservations(
        &self,
        key: &InventoryKey,
        period: &RentalPeriod,
    ) -> Result<Vec<Reservation>>;

    async fn get_order(&self, id: &OrderId) -> Result<Option<RentalOrder>>;

    async fn reservations_for_order(&self, id: &OrderId) -> Result<Vec<Reservation>>;

    async fn invoice_for_order(&self, id: &OrderId) -> Result<Option<Invoice>>;
}

/// An atomic batch of reads and writes.
///
/// Nothing written is visible to other callers until [`UnitOfWork::commit`];
/// dropping the unit of work discards every write.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Serialize against every other unit of work that locks the same key, until
    /// this one ends. Callers locking several keys must lock them in sorted order.
    async fn lock_inventory(&mut self, key: &InventoryKey) -> Result<()>;

    /// Like [`ReservationStore::active_reservations`], including this unit's own writes.
    async fn active_reservations(
        &mut self,
        key: &InventoryKey,
        period: &RentalPeriod,
    ) -> Result<Vec<Reservation>>;

    async fn insert_order(&mut self, order: &RentalOrder) -> Result<()>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()>;

    /// Load an order and hold it against concurrent transitions.
    async fn get_order_for_update(&mut self, id: &OrderId) -> Result<Option<RentalOrder>>;

    async fn update_order(&mut self, order: &RentalOrder) -> Result<()>;

    /// Move every reservation of the order in status `from` to `to`; returns how many moved.
    async fn update_reservation_status(
        &mut self,
        order_id: &OrderId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
