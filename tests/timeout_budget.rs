// tests/timeout_budget.rs
use std::time::Duration;

use preview2pdf::books::{self, BOOKS};
use preview2pdf::config::{CACHE_TIMEOUT, NAVIGATION_TIMEOUT, RENDER_TIMEOUT};
use preview2pdf::timeout::{compute_timeout, TimeoutBudget};
use proptest::prelude::*;

#[test]
fn largest_book_gets_the_largest_budget() {
    let psalms = books::lookup("psa").unwrap();
    let budget = TimeoutBudget::for_book(Some(psalms), &NAVIGATION_TIMEOUT, &RENDER_TIMEOUT);

    for info in BOOKS {
        let other = TimeoutBudget::for_book(Some(info), &NAVIGATION_TIMEOUT, &RENDER_TIMEOUT);
        assert!(other.work <= budget.work, "{} outgrew psalms", info.code);
    }
}

#[test]
fn bookless_jobs_use_base_timeouts() {
    let budget = TimeoutBudget::for_book(None, &NAVIGATION_TIMEOUT, &CACHE_TIMEOUT);
    assert_eq!(budget.navigation, Duration::from_secs(90));
    assert_eq!(budget.work, Duration::from_secs(300));
}

proptest! {
    #[test]
    fn never_below_base(base in 0u64..10_000, per_verse in 0.0f64..5.0, verses in 0u32..5_000) {
        prop_assert!(compute_timeout(base, per_verse, verses) >= base);
    }

    #[test]
    fn grows_with_verse_count(base in 0u64..10_000, per_verse in 0.0f64..5.0, verses in 0u32..5_000) {
        prop_assert!(compute_timeout(base, per_verse, verses + 1) >= compute_timeout(base, per_verse, verses));
    }

    #[test]
    fn negative_rates_fall_back_to_base(base in 0u64..10_000, per_verse in -5.0f64..0.0, verses in 0u32..5_000) {
        prop_assert_eq!(compute_timeout(base, per_verse, verses), base);
    }
}
