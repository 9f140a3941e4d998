use super::{ProductCatalog, ReservationStore, UnitOfWork};
use crate::config::DatabaseConfig;
use crate::domain::invoices::{Invoice, InvoiceLine};
use crate::domain::orders::{OrderLine, RentalOrder};
use crate::domain::products::{Product, ProductVariant, RentalPricing};
use crate::domain::reservations::Reservation;
use crate::domain::types::{
    InventoryKey, InvoiceId, Money, OrderId, ProductId, RentalPeriod, ReservationId,
    ReservationStatus, UserId, VariantId,
};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use rentwise_common::distributed::{lock_for_transaction, AdvisoryLock, LockKey};
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const RESERVATION_COLUMNS: &str = "id, product_id, variant_id, order_id, quantity_reserved, \
     start_date, end_date, status, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, customer_id, vendor_id, lines, total_amount, deposit_paid, \
     payment_status, status, pickup_date, return_date, actual_return_date, late_fee, \
     return_notes, created_at, updated_at";

const ACTIVE_RESERVATIONS_FILTER: &str = "product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 \
     AND status = 'active' AND start_date < $4 AND $3 < end_date";

fn column<T>(row: &PgRow, name: &str) -> Result<T>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| RentalError::database(&format!("decode {name}"), e))
}

fn quantity_column(row: &PgRow, name: &str) -> Result<u32> {
    let value: i32 = column(row, name)?;
    u32::try_from(value).map_err(|_| RentalError::DatabaseError {
        operation: format!("decode {name}"),
        source: format!("negative quantity {value}").into(),
    })
}

fn quantity_param(quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| RentalError::validation("quantity", format!("{quantity} is too large")))
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    let status: String = column(row, "status")?;
    Ok(Reservation {
        id: ReservationId::from_uuid(column(row, "id")?),
        product_id: ProductId::new(column::<String>(row, "product_id")?),
        variant_id: column::<Option<String>>(row, "variant_id")?.map(VariantId::new),
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        quantity_reserved: quantity_column(row, "quantity_reserved")?,
        start_date: column(row, "start_date")?,
        end_date: column(row, "end_date")?,
        status: status.parse()?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<RentalOrder> {
    let payment_status: String = column(row, "payment_status")?;
    let status: String = column(row, "status")?;
    let lines: Json<Vec<OrderLine>> = column(row, "lines")?;

    Ok(RentalOrder {
        id: OrderId::from_uuid(column(row, "id")?),
        customer_id: UserId::new(column::<String>(row, "customer_id")?),
        vendor_id: UserId::new(column::<String>(row, "vendor_id")?),
        lines: lines.0,
        total_amount: Money::from_decimal(column(row, "total_amount")?),
        deposit_paid: Money::from_decimal(column(row, "deposit_paid")?),
        payment_status: payment_status.parse()?,
        status: status.parse()?,
        pickup_date: column(row, "pickup_date")?,
        return_date: column(row, "return_date")?,
        actual_return_date: column(row, "actual_return_date")?,
        late_fee: Money::from_decimal(column(row, "late_fee")?),
        return_notes: column(row, "return_notes")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice> {
    let lines: Json<Vec<InvoiceLine>> = column(row, "lines")?;
    Ok(Invoice {
        id: InvoiceId::from_uuid(column(row, "id")?),
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        customer_id: UserId::new(column::<String>(row, "customer_id")?),
        vendor_id: UserId::new(column::<String>(row, "vendor_id")?),
        lines: lines.0,
        tax_rate: column::<Decimal>(row, "tax_rate")?,
        subtotal: Money::from_decimal(column(row, "subtotal")?),
        tax_amount: Money::from_decimal(column(row, "tax_amount")?),
        deposit: Money::from_decimal(column(row, "deposit")?),
        total: Money::from_decimal(column(row, "total")?),
        created_at: column(row, "created_at")?,
    })
}

/// PostgreSQL store; each unit of work is one database transaction.
#[derive(Clone)]
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| RentalError::database("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations while holding the migration advisory lock, so
    /// deployments starting together run them once.
    pub async fn migrate(&self) -> Result<()> {
        let guard = AdvisoryLock::new(self.pool.clone())
            .acquire_with_timeout(LockKey::MIGRATIONS, 300)
            .await?;

        info!("Running database migrations");
        let outcome = MIGRATOR.run(&self.pool).await.map_err(|e| {
            RentalError::DatabaseError {
                operation: "migrate".to_string(),
                source: Box::new(e),
            }
        });
        guard.release().await?;
        outcome?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RentalError::database("begin", e))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn active_reservations(
        &self,
        key: &InventoryKey,
        period: &RentalPeriod,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM rental.reservations WHERE {ACTIVE_RESERVATIONS_FILTER}"
        ))
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_ref().map(|v| v.as_str()))
        .bind(period.start())
        .bind(period.end())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RentalError::database("active_reservations", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<RentalOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM rental.orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RentalError::database("get_order", e))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn reservations_for_order(&self, id: &OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM rental.reservations WHERE order_id = $1 ORDER BY created_at, id"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RentalError::database("reservations_for_order", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn invoice_for_order(&self, id: &OrderId) -> Result<Option<Invoice>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, customer_id, vendor_id, lines, tax_rate, subtotal,
                   tax_amount, deposit, total, created_at
            FROM rental.invoices
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RentalError::database("invoice_for_order", e))?;

        row.as_ref().map(invoice_from_row).transpose()
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_inventory(&mut self, key: &InventoryKey) -> Result<()> {
        let lock_key = LockKey::for_inventory(
            key.product_id.as_str(),
            key.variant_id.as_ref().map(|v| v.as_str()),
        );
        lock_for_transaction(&mut *self.tx, lock_key).await?;
        debug!("Locked inventory {} ({})", key, lock_key);
        Ok(())
    }

    async fn active_reservations(
        &mut self,
        key: &InventoryKey,
        period: &RentalPeriod,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM rental.reservations WHERE {ACTIVE_RESERVATIONS_FILTER}"
        ))
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_ref().map(|v| v.as_str()))
        .bind(period.start())
        .bind(period.end())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("active_reservations", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn insert_order(&mut self, order: &RentalOrder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rental.orders
            (id, customer_id, vendor_id, lines, total_amount, deposit_paid, payment_status,
             status, pickup_date, return_date, actual_return_date, late_fee, return_notes,
             created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(order.vendor_id.as_str())
        .bind(Json(&order.lines))
        .bind(order.total_amount.as_decimal())
        .bind(order.deposit_paid.as_decimal())
        .bind(order.payment_status.to_string())
        .bind(order.status.to_string())
        .bind(order.pickup_date)
        .bind(order.return_date)
        .bind(order.actual_return_date)
        .bind(order.late_fee.as_decimal())
        .bind(order.return_notes.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("insert_order", e))?;

        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rental.reservations
            (id, product_id, variant_id, order_id, quantity_reserved, start_date, end_date,
             status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(reservation.variant_id.as_ref().map(|v| v.as_str()))
        .bind(reservation.order_id.as_uuid())
        .bind(quantity_param(reservation.quantity_reserved)?)
        .bind(reservation.start_date)
        .bind(reservation.end_date)
        .bind(reservation.status.to_string())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("insert_reservation", e))?;

        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rental.invoices
            (id, order_id, customer_id, vendor_id, lines, tax_rate, subtotal, tax_amount,
             deposit, total, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.order_id.as_uuid())
        .bind(invoice.customer_id.as_str())
        .bind(invoice.vendor_id.as_str())
        .bind(Json(&invoice.lines))
        .bind(invoice.tax_rate)
        .bind(invoice.subtotal.as_decimal())
        .bind(invoice.tax_amount.as_decimal())
        .bind(invoice.deposit.as_decimal())
        .bind(invoice.total.as_decimal())
        .bind(invoice.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("insert_invoice", e))?;

        Ok(())
    }

    async fn get_order_for_update(&mut self, id: &OrderId) -> Result<Option<RentalOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM rental.orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("get_order_for_update", e))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_order(&mut self, order: &RentalOrder) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE rental.orders
            SET status = $2, pickup_date = $3, actual_return_date = $4, late_fee = $5,
                return_notes = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.to_string())
        .bind(order.pickup_date)
        .bind(order.actual_return_date)
        .bind(order.late_fee.as_decimal())
        .bind(order.return_notes.as_deref())
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(RentalError::OrderNotFound {
                id: order.id.to_string(),
            });
        }

        Ok(())
    }

    async fn update_reservation_status(
        &mut self,
        order_id: &OrderId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<u64> {
        if !from.can_transition_to(to) {
            return Err(RentalError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE rental.reservations
            SET status = $3, updated_at = NOW()
            WHERE order_id = $1 AND status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("update_reservation_status", e))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| RentalError::database("commit", e))
    }
}

/// Reads products from the catalog service's `rental.products` table.
#[derive(Clone)]
pub struct SqlProductCatalog {
    pool: PgPool,
}

impl SqlProductCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for SqlProductCatalog {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, name, quantity_on_hand, variants, rental_pricing,
                   security_deposit
            FROM rental.products
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RentalError::database("get_product", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let variants: Json<Vec<ProductVariant>> = column(&row, "variants")?;
        let pricing: Option<Json<RentalPricing>> = column(&row, "rental_pricing")?;
        let deposit: Option<Decimal> = column(&row, "security_deposit")?;

        Ok(Some(Product {
            id: ProductId::new(column::<String>(&row, "id")?),
            vendor_id: UserId::new(column::<String>(&row, "vendor_id")?),
            name: column(&row, "name")?,
            quantity_on_hand: quantity_column(&row, "quantity_on_hand")?,
            variants: variants.0,
            rental_pricing: pricing.map(|p| p.0),
            security_deposit: deposit.map(Money::from_decimal),
        }))
    }
}
