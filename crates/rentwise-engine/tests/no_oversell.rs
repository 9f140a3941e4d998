mod common;

use chrono::Duration;
use common::*;
use futures::future::join_all;
use proptest::prelude::*;
use rentwise_engine::domain::{OrderLifecycle, ReservationStatus};
use rentwise_engine::RentalError;
use std::sync::Arc;

const CAPACITY: u32 = 2;

fn attempts() -> impl Strategy<Value = Vec<(u32, u32, u32)>> {
    prop::collection::vec((1u32..=3, 1u32..=20, 1u32..=5), 1..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_concurrent_confirmations_never_oversell(attempts in attempts()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (confirmed, reservations) = runtime.block_on(async {
            let h = harness();
            let lifecycle: Arc<OrderLifecycle> = Arc::new(h.lifecycle);

            let tasks: Vec<_> = attempts
                .iter()
                .map(|&(quantity, start_day, days)| {
                    let lifecycle = lifecycle.clone();
                    tokio::spawn(async move {
                        let start = at(start_day);
                        let end = start + Duration::days(i64::from(days));
                        lifecycle
                            .confirm_order(camera_request(quantity, start, end))
                            .await
                    })
                })
                .collect();

            let mut confirmed = 0usize;
            for outcome in join_all(tasks).await {
                match outcome.unwrap() {
                    Ok(_) => confirmed += 1,
                    Err(RentalError::InsufficientAvailability { .. }) => {}
                    Err(other) => panic!("unexpected failure: {other}"),
                }
            }
            (confirmed, h.store.all_reservations().await)
        });

        prop_assert_eq!(reservations.len(), confirmed);
        prop_assert!(reservations.iter().all(|r| r.status == ReservationStatus::Active));

        for hour in 0..(26 * 24) {
            let instant = at(1) + Duration::hours(hour);
            let held: u32 = reservations
                .iter()
                .filter(|r| r.start_date <= instant && instant < r.end_date)
                .map(|r| r.quantity_reserved)
                .sum();
            prop_assert!(held <= CAPACITY, "{} units held at {}", held, instant);
        }
    }
}
