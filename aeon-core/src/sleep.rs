//! Splitting a long sleep into timer-sized pieces
//!
//! The RTC wake timer cannot span more than [`MAX_TIMER_SPAN_SECS`], so a
//! 24 hour interval becomes one 18 hour sleep followed by a 6 hour one, with
//! the remainder persisted in between.

/// Longest single deep sleep the RTC timer can represent (18 hours)
pub const MAX_TIMER_SPAN_SECS: u32 = 18 * 60 * 60;

/// Interval used when the selector reads zero
pub const DEFAULT_INTERVAL_HOURS: u16 = 24;

/// One slice of a sleep budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepBudget {
    /// Seconds to sleep this time
    pub next_sleep: u32,
    /// Seconds still owed afterwards
    pub remaining: u32,
}

/// Next slice of the budget.
///
/// A non-zero `remaining` continues the budget in progress; otherwise a fresh
/// budget of `interval_hours` (zero meaning 24) is started.
pub fn sleep_budget(remaining: u32, interval_hours: u16) -> SleepBudget {
    let total = if remaining != 0 {
        remaining
    } else {
        let hours = if interval_hours == 0 {
            DEFAULT_INTERVAL_HOURS
        } else {
            interval_hours
        };
        u32::from(hours) * 3600
    };
    let next_sleep = total.min(MAX_TIMER_SPAN_SECS);
    SleepBudget {
        next_sleep,
        remaining: total - next_sleep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fresh_day_is_split() {
        assert_eq!(
            sleep_budget(0, 24),
            SleepBudget {
                next_sleep: 64_800,
                remaining: 21_600,
            }
        );
        assert_eq!(
            sleep_budget(21_600, 24),
            SleepBudget {
                next_sleep: 21_600,
                remaining: 0,
            }
        );
    }

    #[test]
    fn test_zero_interval_means_a_day() {
        assert_eq!(sleep_budget(0, 0), sleep_budget(0, 24));
    }

    #[test]
    fn test_short_interval_fits_one_sleep() {
        assert_eq!(
            sleep_budget(0, 6),
            SleepBudget {
                next_sleep: 21_600,
                remaining: 0,
            }
        );
    }

    #[test]
    fn test_interval_ignored_while_budget_pending() {
        assert_eq!(
            sleep_budget(100, 48),
            SleepBudget {
                next_sleep: 100,
                remaining: 0,
            }
        );
    }

    #[test]
    fn test_large_interval_needs_several_slices() {
        let mut budget = sleep_budget(0, 72);
        let mut slept = budget.next_sleep;
        let mut wakes = 1;
        while budget.remaining != 0 {
            budget = sleep_budget(budget.remaining, 72);
            slept += budget.next_sleep;
            wakes += 1;
        }
        assert_eq!(slept, 72 * 3600);
        assert_eq!(wakes, 4);
    }

    proptest! {
        #[test]
        fn prop_slice_bounded_and_conserving(
            remaining in 0u32..1_000_000,
            interval in any::<u16>()
        ) {
            let budget = sleep_budget(remaining, interval);
            prop_assert!(budget.next_sleep <= MAX_TIMER_SPAN_SECS);
            prop_assert!(budget.next_sleep > 0);

            let total = if remaining != 0 {
                remaining
            } else if interval == 0 {
                24 * 3600
            } else {
                u32::from(interval) * 3600
            };
            prop_assert_eq!(budget.next_sleep + budget.remaining, total);
        }

        #[test]
        fn prop_budget_drains(interval in 1u16..200) {
            let mut budget = sleep_budget(0, interval);
            let mut steps = 1u32;
            while budget.remaining != 0 {
                let before = budget.remaining;
                budget = sleep_budget(budget.remaining, interval);
                prop_assert!(budget.remaining < before);
                steps += 1;
            }
            let slices = (u32::from(interval) * 3600).div_ceil(MAX_TIMER_SPAN_SECS);
            prop_assert_eq!(steps, slices);
        }
    }
}
