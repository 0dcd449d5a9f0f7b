//! Property tests for poll window selection

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::*;
use proptest::prelude::*;

use newsletter::dispatch::{DispatchStrategy, DEFAULT_DESTINATION};
use newsletter::models::ContentStatus;
use newsletter::scheduler::{poll_window, POLL_WINDOW_SECS};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn window_is_symmetric_and_inclusive(secs in 0i64..4_000_000_000, millis in 0u32..1000) {
        let now = Utc.timestamp_opt(secs, millis * 1_000_000).unwrap();
        let (start, end) = poll_window(now);

        prop_assert_eq!(now - start, Duration::seconds(POLL_WINDOW_SECS));
        prop_assert_eq!(end - now, Duration::seconds(POLL_WINDOW_SECS));
    }

    #[test]
    fn only_items_inside_window_transition(offsets in prop::collection::vec(-120i64..=120, 1..12)) {
        let rt = runtime();
        rt.block_on(async {
            let h = Harness::new();
            let topic = h.topic_with_subscribers("rust", &[]).await;

            let mut items = Vec::new();
            for (i, secs) in offsets.iter().enumerate() {
                items.push((*secs, h.content_at(&topic, &format!("item {i}"), *secs).await));
            }

            let broker = RecordingBroker::new();
            let dispatcher = h.dispatcher(DispatchStrategy::queue(broker.clone(), DEFAULT_DESTINATION));
            let report = dispatcher.check_and_dispatch().await.unwrap();

            let inside = offsets.iter().filter(|s| s.abs() <= POLL_WINDOW_SECS).count();
            assert_eq!(report.found, inside);
            assert_eq!(broker.enqueued().len(), inside);

            for (secs, item) in &items {
                let (status, sent) = h.status_of(item).await;
                if secs.abs() <= POLL_WINDOW_SECS {
                    assert_eq!((status, sent), (ContentStatus::Sent, true));
                } else {
                    assert_eq!((status, sent), (ContentStatus::Pending, false));
                }
            }

            // A second poll at the same instant finds nothing left to do
            let again = dispatcher.check_and_dispatch().await.unwrap();
            assert_eq!(again.found, 0);
        });
    }
}
