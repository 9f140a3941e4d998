use super::{ProductCatalog, ReservationStore, UnitOfWork};
use crate::domain::invoices::Invoice;
use crate::domain::orders::RentalOrder;
use crate::domain::products::Product;
use crate::domain::reservations::Reservation;
use crate::domain::types::{InventoryKey, OrderId, ProductId, RentalPeriod, ReservationStatus};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: HashMap<OrderId, RentalOrder>,
    reservations: Vec<Reservation>,
    invoices: HashMap<OrderId, Invoice>,
}

impl MemoryState {
    fn active_reservations(&self, key: &InventoryKey, period: &RentalPeriod) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|r| r.claims(key, period))
            .cloned()
            .collect()
    }
}

/// Process-local store for tests and single-node tooling.
///
/// A unit of work holds the store mutex from `begin` until it is committed or
/// dropped, so units of work run one at a time and `lock_inventory` has nothing
/// left to do.
#[derive(Clone, Default)]
pub struct MemoryReservationStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every reservation ever written, in insertion order.
    pub async fn all_reservations(&self) -> Vec<Reservation> {
        self.state.lock().await.reservations.clone()
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn active_reservations(
        &self,
        key: &InventoryKey,
        period: &RentalPeriod,
    ) -> Result<Vec<Reservation>> {
        Ok(self.state.lock().await.active_reservations(key, period))
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<RentalOrder>> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn reservations_for_order(&self, id: &OrderId) -> Result<Vec<Reservation>> {
        Ok(self
            .state
            .lock()
            .await
            .reservations
            .iter()
            .filter(|r| &r.order_id == id)
            .cloned()
            .collect())
    }

    async fn invoice_for_order(&self, id: &OrderId) -> Result<Option<Invoice>> {
        Ok(self.state.lock().await.invoices.get(id).cloned())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_inventory(&mut self, _key: &InventoryKey) -> Result<()> {
        Ok(())
    }

    async fn active_reservations(
        &mut self,
        key: &InventoryKey,
        period: &RentalPeriod,
    ) -> Result<Vec<Reservation>> {
        Ok(self.staged.active_reservations(key, period))
    }

    async fn insert_order(&mut self, order: &RentalOrder) -> Result<()> {
        if self.staged.orders.contains_key(&order.id) {
            return Err(RentalError::validation(
                "id",
                format!("order {} already exists", order.id),
            ));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()> {
        if !self.staged.orders.contains_key(&reservation.order_id) {
            return Err(RentalError::OrderNotFound {
                id: reservation.order_id.to_string(),
            });
        }
        self.staged.reservations.push(reservation.clone());
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        if !self.staged.orders.contains_key(&invoice.order_id) {
            return Err(RentalError::OrderNotFound {
                id: invoice.order_id.to_string(),
            });
        }
        self.staged.invoices.insert(invoice.order_id, invoice.clone());
        Ok(())
    }

    async fn get_order_for_update(&mut self, id: &OrderId) -> Result<Option<RentalOrder>> {
        Ok(self.staged.orders.get(id).cloned())
    }

    async fn update_order(&mut self, order: &RentalOrder) -> Result<()> {
        match self.staged.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(RentalError::OrderNotFound {
                id: order.id.to_string(),
            }),
        }
    }

    async fn update_reservation_status(
        &mut self,
        order_id: &OrderId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<u64> {
        let mut moved = 0;
        for reservation in self
            .staged
            .reservations
            .iter_mut()
            .filter(|r| &r.order_id == order_id && r.status == from)
        {
            reservation.transition_to(to)?;
            moved += 1;
        }
        Ok(moved)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

/// Catalog backed by a map, seeded by the caller.
#[derive(Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self {
            products: Arc::new(RwLock::new(products)),
        }
    }

    pub async fn upsert(&self, product: Product) {
        self.products.write().await.insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }
}
