use std::time::Duration;

use crate::books::BookInfo;

/// Scales a base timeout by the number of verses in a book.
///
/// Never returns less than `base_seconds`.
pub fn compute_timeout(base_seconds: u64, per_verse_seconds: f64, verse_count: u32) -> u64 {
    if verse_count == 0 || per_verse_seconds <= 0.0 || !per_verse_seconds.is_finite() {
        return base_seconds;
    }
    let derived = (base_seconds as f64 + f64::from(verse_count) * per_verse_seconds).ceil();
    base_seconds.max(derived as u64)
}

/// A base timeout plus its per-verse growth, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutRule {
    pub base_seconds: u64,
    pub per_verse_seconds: f64,
}

impl TimeoutRule {
    pub const fn new(base_seconds: u64, per_verse_seconds: f64) -> Self {
        Self {
            base_seconds,
            per_verse_seconds,
        }
    }

    pub fn for_book(&self, book: Option<&BookInfo>) -> Duration {
        let seconds = match book {
            Some(info) => compute_timeout(self.base_seconds, self.per_verse_seconds, info.verse_count),
            None => self.base_seconds,
        };
        Duration::from_secs(seconds)
    }
}

/// Time limits for one book: how long navigation may take, and how long the
/// render (export) or cache POST (warm) may take afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    pub navigation: Duration,
    pub work: Duration,
}

impl TimeoutBudget {
    pub fn for_book(book: Option<&BookInfo>, navigation: &TimeoutRule, work: &TimeoutRule) -> Self {
        Self {
            navigation: navigation.for_book(book),
            work: work.for_book(book),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::lookup;

    #[test]
    fn zero_verses_or_rate_keeps_base() {
        assert_eq!(compute_timeout(90, 0.05, 0), 90);
        assert_eq!(compute_timeout(90, 0.0, 1533), 90);
        assert_eq!(compute_timeout(90, -1.0, 1533), 90);
    }

    #[test]
    fn grows_with_verse_count() {
        // 600 + 1533 * 0.15 = 829.95
        assert_eq!(compute_timeout(600, 0.15, 1533), 830);
        // 90 + 13 * 0.05 = 90.65
        assert_eq!(compute_timeout(90, 0.05, 13), 91);
    }

    #[test]
    fn budget_for_bookless_job_uses_bases() {
        let nav = TimeoutRule::new(90, 0.05);
        let render = TimeoutRule::new(600, 0.15);
        let budget = TimeoutBudget::for_book(None, &nav, &render);
        assert_eq!(budget.navigation, Duration::from_secs(90));
        assert_eq!(budget.work, Duration::from_secs(600));
    }

    #[test]
    fn budget_for_psalms() {
        let nav = TimeoutRule::new(90, 0.05);
        let cache = TimeoutRule::new(300, 0.1);
        let budget = TimeoutBudget::for_book(lookup("psa"), &nav, &cache);
        // 2461 verses
        assert_eq!(budget.navigation, Duration::from_secs(214));
        assert_eq!(budget.work, Duration::from_secs(547));
    }
}
