//! Operator CLI for the Rentwise reservation engine

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use rentwise_engine::domain::{
    ConfirmOrderRequest, GstInvoiceGenerator, NotificationSink, OrderId, OrderLifecycle,
    OrderStatus, PricingEngine, ProductId, QueuedNotificationSink, RentalPeriod,
    TracingNotificationSink, UserId, VariantId,
};
use rentwise_engine::storage::{PgReservationStore, ReservationStore, SqlProductCatalog};
use rentwise_engine::{RentalConfig, RentalError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "rentwise-engine",
    about = "Rentwise reservation and order lifecycle engine",
    version,
    author
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    gen_config: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Check whether units are free over an interval
    Check {
        #[arg(long)]
        product: String,
        #[arg(long)]
        variant: Option<String>,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        /// RFC 3339 start instant
        #[arg(long)]
        start: DateTime<Utc>,
        /// RFC 3339 end instant
        #[arg(long)]
        end: DateTime<Utc>,
    },

    /// Confirm an order from a JSON request file
    Confirm {
        #[arg(long, value_name = "FILE")]
        request: PathBuf,
    },

    /// Hand an order over to the customer
    Pickup {
        #[arg(long)]
        order: OrderId,
        #[arg(long)]
        actor: String,
    },

    /// Take an order back from the customer
    Return {
        #[arg(long)]
        order: OrderId,
        #[arg(long)]
        actor: String,
        /// Actual return instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Condition notes recorded with the return
        #[arg(long)]
        notes: Option<String>,
    },

    /// Cancel a confirmed order
    Cancel {
        #[arg(long)]
        order: OrderId,
        #[arg(long)]
        actor: String,
    },

    /// Print an order with its reservations and invoice
    Show {
        #[arg(long)]
        order: OrderId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.gen_config {
        println!("{}", RentalConfig::generate_example()?);
        return Ok(());
    }

    let config = RentalConfig::load(args.config.as_deref())?;

    let log_filter = format!("{}=info", env!("CARGO_BIN_NAME").replace('-', "_"));
    rentwise_common::logging::init_logging(&args.verbosity, &log_filter, config.logging.format)?;

    let Some(command) = args.command else {
        info!(
            "Configuration valid (environment {}, service {}); no command given",
            config.service.environment, config.service.service_id
        );
        return Ok(());
    };

    if let Err(e) = run(command, &config).await {
        match e.downcast_ref::<RentalError>() {
            Some(rental) if rental.is_business_outcome() => {
                warn!(code = rental.error_code(), "{}", rental);
                std::process::exit(2);
            }
            Some(rental) => {
                error!(code = rental.error_code(), "{}", rental);
                std::process::exit(1);
            }
            None => return Err(e),
        }
    }

    Ok(())
}

async fn run(command: Command, config: &RentalConfig) -> Result<()> {
    let store = PgReservationStore::connect(&config.database).await?;

    let (sink, mut queue) = QueuedNotificationSink::new(config.notifications.queue_capacity);
    let delivery = tokio::spawn(async move {
        while let Some(notification) = queue.recv().await {
            if let Err(e) = TracingNotificationSink.notify(notification).await {
                warn!("Notification delivery failed: {}", e);
            }
        }
    });

    let lifecycle = OrderLifecycle::new(
        Arc::new(SqlProductCatalog::new(store.pool().clone())),
        Arc::new(store.clone()),
        Arc::new(GstInvoiceGenerator),
        Arc::new(sink),
        config.settings.clone(),
    );

    let outcome = execute(command, &lifecycle, &store).await;

    // Closing the last sender lets the delivery task drain and finish.
    drop(lifecycle);
    delivery.await.context("notification delivery task failed")?;

    outcome
}

async fn execute(
    command: Command,
    lifecycle: &OrderLifecycle,
    store: &PgReservationStore,
) -> Result<()> {
    match command {
        Command::Migrate => store.migrate().await?,
        Command::Check {
            product,
            variant,
            quantity,
            start,
            end,
        } => {
            let period = RentalPeriod::new(start, end)?;
            let variant = variant.map(VariantId::new);
            let result = lifecycle
                .check_availability(&ProductId::new(product), variant.as_ref(), quantity, &period)
                .await?;
            print_json(&result)?;
        }
        Command::Confirm { request } => {
            let text = std::fs::read_to_string(&request)
                .with_context(|| format!("failed to read {}", request.display()))?;
            let request: ConfirmOrderRequest = serde_json::from_str(&text)
                .with_context(|| format!("invalid order request in {}", request.display()))?;
            print_json(&lifecycle.confirm_order(request).await?)?;
        }
        Command::Pickup { order, actor } => {
            print_json(&lifecycle.mark_picked_up(&order, &UserId::new(actor)).await?)?;
        }
        Command::Return {
            order,
            actor,
            at,
            notes,
        } => {
            let order = lifecycle
                .mark_returned(&order, &UserId::new(actor), at, notes)
                .await?;
            print_json(&order)?;
        }
        Command::Cancel { order, actor } => {
            print_json(&lifecycle.cancel_order(&order, &UserId::new(actor)).await?)?;
        }
        Command::Show { order } => {
            let order = lifecycle.get_order(&order).await?;
            let accrued_late_fee = (order.status == OrderStatus::WithCustomer)
                .then(|| PricingEngine::late_fee(&order, lifecycle.settings().late_fee_per_day));
            let reservations = store.reservations_for_order(&order.id).await?;
            let invoice = store.invoice_for_order(&order.id).await?;

            print_json(&serde_json::json!({
                "order": order,
                "amount_due": order.amount_due(),
                "accrued_late_fee": accrued_late_fee,
                "reservations": reservations,
                "invoice": invoice,
            }))?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
