//! Register store properties.
//!
//! Verifies that:
//! - A value is stored iff its hex length matches the register class
//! - A rejected value leaves the stored value untouched
//! - For one address, changed + unchanged == accepted updates - 1

use genmon_core::store::{RegisterStore, UpdateOutcome};
use proptest::prelude::*;

// base register, one word
const BASE: u16 = 0x0005;
// prime register, two words
const STATUS: u16 = 0x0001;

proptest! {
    #[test]
    fn accepts_iff_length_matches(raw in "[0-9a-f]{0,12}") {
        let mut store = RegisterStore::new(true);
        store.update(BASE, "abcd");
        let outcome = store.update(BASE, &raw);
        if raw.len() == 4 {
            let rejected = matches!(outcome, UpdateOutcome::Rejected { .. });
            prop_assert!(!rejected, "4-digit value rejected: {:?}", outcome);
            prop_assert_eq!(store.get(BASE), Some(raw.clone()));
        } else {
            prop_assert_eq!(outcome, UpdateOutcome::Rejected { expected: 4, actual: raw.len() });
            let kept = store.get(BASE);
            prop_assert_eq!(kept.as_deref(), Some("abcd"));
        }
    }

    #[test]
    fn counters_cover_every_update_after_the_first(values in proptest::collection::vec(0u32..4, 1..60)) {
        let mut store = RegisterStore::new(true);
        for v in &values {
            store.update(STATUS, &format!("{v:08x}"));
        }
        let stats = store.stats();
        prop_assert_eq!(stats.changed + stats.unchanged, values.len() as u64 - 1);
        prop_assert_eq!(store.len(), 1);
    }
}

#[test]
fn log_window_ignored_on_wrong_family() {
    let mut store = RegisterStore::new(false);
    // Evolution service log slot
    assert_eq!(store.update(0x04e2, "0102030405060708"), UpdateOutcome::Unknown);
    store.set_evolution(true);
    assert_eq!(store.update(0x04e2, "0102030405060708"), UpdateOutcome::First);
}
