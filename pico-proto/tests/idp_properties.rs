//! Property tests for IDP allocation and the exchange state machine

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    num::NonZeroU32,
    time::{Duration, Instant},
};

use pico_proto::{
    Exchange, ExchangeConfig, ExchangeEvent, ExchangeFailure, IdpAllocator, IdpCounter, Message,
};
use proptest::prelude::*;
use serde_json::json;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(config())]

    /// Ranges from one allocator are disjoint and each starts where the previous ended
    #[test]
    fn ranges_disjoint_and_contiguous(
        first in 0u32..1_000_000,
        size in 1u32..50_000,
        count in 1usize..32,
    ) {
        let mut alloc = IdpAllocator::new(first, NonZeroU32::new(size).unwrap());
        let ranges = (0..count).map(|_| alloc.allocate().unwrap()).collect::<Vec<_>>();
        prop_assert_eq!(ranges[0].start(), first);
        for pair in ranges.windows(2) {
            prop_assert_eq!(u64::from(pair[1].start()), pair[0].end());
        }
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                prop_assert!(!a.overlaps(b));
            }
        }
    }

    /// Any IDP is claimed by at most one range
    #[test]
    fn single_owner(size in 1u32..1_000, count in 1usize..16, idp in 0u32..20_000) {
        let mut alloc = IdpAllocator::new(1, NonZeroU32::new(size).unwrap());
        let owners = (0..count)
            .map(|_| alloc.allocate().unwrap())
            .filter(|range| range.contains(idp))
            .count();
        prop_assert!(owners <= 1);
        let expected = usize::from(idp >= 1 && u64::from(idp) < 1 + u64::from(size) * count as u64);
        prop_assert_eq!(owners, expected);
    }

    /// After `size` draws the counter is back at the start of its range
    #[test]
    fn counter_wraps_after_size_draws(start in 0u32..1_000_000, size in 1u32..2_000) {
        let mut alloc = IdpAllocator::new(start, NonZeroU32::new(size).unwrap());
        let range = alloc.allocate().unwrap();
        let mut counter = IdpCounter::new(range);
        for _ in 0..size {
            let idp = counter.next_idp();
            prop_assert!(range.contains(idp));
        }
        prop_assert_eq!(counter.next_idp(), range.start());
    }

    /// An ACK that is never followed up fails the exchange no later than the ACK window
    #[test]
    fn ack_window_bounds_exchange(ack_after_ms in 0u64..10_000, window_ms in 1u64..5_000) {
        let mut config = ExchangeConfig::default();
        config
            .response_timeout(Duration::from_secs(15))
            .ack_timeout(Duration::from_millis(window_ms));
        let start = Instant::now();
        let mut exchange = Exchange::new(9, start, &config);
        let acked = start + Duration::from_millis(ack_after_ms);
        let ack = Message::from_value(json!({"idp": 9, "frm": "mst", "res": 99})).unwrap();
        prop_assert_eq!(exchange.handle(ack, acked), Some(ExchangeEvent::Acknowledged));

        let wake = exchange.poll_timeout().unwrap();
        prop_assert!(wake <= acked + Duration::from_millis(window_ms));
        let failure = exchange.handle_timeout(wake).unwrap();
        let ack_deadline = acked + Duration::from_millis(window_ms);
        let expected = if ack_deadline <= start + Duration::from_secs(15) {
            ExchangeFailure::AckWithoutFollowup
        } else {
            ExchangeFailure::Timeout
        };
        prop_assert_eq!(failure, expected);
    }

    /// Frames for other IDPs never complete an exchange
    #[test]
    fn foreign_idps_ignored(idp in 1u32..1_000, other in 1u32..1_000, res in -5i64..200) {
        prop_assume!(idp != other);
        let now = Instant::now();
        let mut exchange = Exchange::new(idp, now, &ExchangeConfig::default());
        let frame = Message::from_value(json!({"idp": other, "frm": "mst", "res": res})).unwrap();
        prop_assert_eq!(exchange.handle(frame, now), None);
        prop_assert!(!exchange.is_finished());
    }
}
