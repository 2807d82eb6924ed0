//! AIMD concurrency control for embedding batches.
//!
//! Outcomes land in a fixed-size sliding window. A success rate above
//! `increase_above` grows concurrency by one; a rate below `decrease_below`
//! halves it. The level is always within `[min, max]`.

use scry_core::config::AdaptiveConfig;
use scry_core::constants::{AIMD_DECREASE_BELOW, AIMD_INCREASE_ABOVE, AIMD_WINDOW};
use scry_state::embedding::ProviderCategory;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimdTuning {
    pub window: usize,
    pub increase_above: f64,
    pub decrease_below: f64,
}

impl Default for AimdTuning {
    fn default() -> Self {
        Self {
            window: AIMD_WINDOW,
            increase_above: AIMD_INCREASE_ABOVE,
            decrease_below: AIMD_DECREASE_BELOW,
        }
    }
}

impl From<&AdaptiveConfig> for AimdTuning {
    fn from(config: &AdaptiveConfig) -> Self {
        Self {
            window: config.window.max(1),
            increase_above: config.increase_above,
            decrease_below: config.decrease_below,
        }
    }
}

#[derive(Debug)]
pub struct AdaptiveConcurrencyController {
    min: usize,
    max: usize,
    tuning: AimdTuning,
    /// Lock-free mirror of the level; only written while `outcomes` is held.
    current: AtomicUsize,
    outcomes: Mutex<VecDeque<bool>>,
}

impl AdaptiveConcurrencyController {
    /// Bounds are normalized so that `1 <= min <= initial <= max`.
    pub fn new(initial: usize, min: usize, max: usize) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        let initial = initial.clamp(min, max);
        Self {
            min,
            max,
            tuning: AimdTuning::default(),
            current: AtomicUsize::new(initial),
            outcomes: Mutex::new(VecDeque::with_capacity(AIMD_WINDOW)),
        }
    }

    /// Starting profile for a provider: a local single-session model never
    /// runs batches in parallel, a remote API starts at 2 and may reach 8.
    pub fn for_provider(category: ProviderCategory) -> Self {
        Self::for_provider_with(category, &AdaptiveConfig::default())
    }

    pub fn for_provider_with(category: ProviderCategory, config: &AdaptiveConfig) -> Self {
        let controller = match category {
            ProviderCategory::Local => Self::new(1, 1, 1),
            ProviderCategory::Remote => Self::new(
                config.remote_initial_concurrency,
                1,
                config.remote_max_concurrency,
            ),
        };
        controller.with_tuning(AimdTuning::from(config))
    }

    pub fn with_tuning(mut self, tuning: AimdTuning) -> Self {
        self.tuning = AimdTuning {
            window: tuning.window.max(1),
            ..tuning
        };
        self
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn min_concurrency(&self) -> usize {
        self.min
    }

    pub fn max_concurrency(&self) -> usize {
        self.max
    }

    fn outcomes(&self) -> MutexGuard<'_, VecDeque<bool>> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Success rate over the window; 1.0 before any outcome is recorded.
    pub fn success_rate(&self) -> f64 {
        rate(&self.outcomes())
    }

    /// Record one batch outcome and return the (possibly adjusted) level.
    pub fn record(&self, success: bool) -> usize {
        let mut outcomes = self.outcomes();
        outcomes.push_back(success);
        while outcomes.len() > self.tuning.window {
            outcomes.pop_front();
        }

        let current = self.current.load(Ordering::Acquire);
        if outcomes.len() < self.min {
            return current;
        }

        let rate = rate(&outcomes);
        let next = if rate > self.tuning.increase_above && current < self.max {
            current + 1
        } else if rate < self.tuning.decrease_below && current > self.min {
            (current / 2).max(self.min)
        } else {
            current
        };
        if next != current {
            self.current.store(next, Ordering::Release);
            debug!(from = current, to = next, rate, "embedding concurrency adjusted");
        }
        next
    }
}

fn rate(outcomes: &VecDeque<bool>) -> f64 {
    if outcomes.is_empty() {
        return 1.0;
    }
    outcomes.iter().filter(|ok| **ok).count() as f64 / outcomes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn successes_climb_to_max_and_stop() {
        let controller = AdaptiveConcurrencyController::new(2, 1, 8);
        for _ in 0..10 {
            controller.record(true);
        }
        assert_eq!(controller.current(), 8);
    }

    #[test]
    fn failures_halve_down_to_min_and_stop() {
        let controller = AdaptiveConcurrencyController::new(4, 1, 8);
        for _ in 0..10 {
            controller.record(false);
        }
        assert_eq!(controller.current(), 1);
    }

    #[test]
    fn stable_zone_leaves_level_unchanged() {
        let controller = AdaptiveConcurrencyController::new(4, 4, 8).with_tuning(AimdTuning {
            window: 10,
            ..AimdTuning::default()
        });
        // 8 of 10 succeed: 0.8 sits between the thresholds.
        for success in [false, true, true, true, true, false, true, true, true, true] {
            controller.record(success);
        }
        assert_eq!(controller.current(), 4);
        controller.record(true);
        controller.record(false);
        assert_eq!(controller.current(), 4);
        assert!((controller.success_rate() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn window_evicts_oldest_outcomes() {
        let controller = AdaptiveConcurrencyController::new(1, 1, 1).with_tuning(AimdTuning {
            window: 3,
            ..AimdTuning::default()
        });
        controller.record(false);
        controller.record(false);
        controller.record(true);
        controller.record(true);
        controller.record(true);
        assert_eq!(controller.success_rate(), 1.0);
    }

    #[test]
    fn empty_window_reports_full_success() {
        let controller = AdaptiveConcurrencyController::new(2, 1, 8);
        assert_eq!(controller.success_rate(), 1.0);
    }

    #[test]
    fn provider_profiles() {
        let local = AdaptiveConcurrencyController::for_provider(ProviderCategory::Local);
        assert_eq!(
            (local.current(), local.min_concurrency(), local.max_concurrency()),
            (1, 1, 1)
        );
        for _ in 0..5 {
            local.record(true);
        }
        assert_eq!(local.current(), 1);

        let remote = AdaptiveConcurrencyController::for_provider(ProviderCategory::Remote);
        assert_eq!(
            (remote.current(), remote.min_concurrency(), remote.max_concurrency()),
            (2, 1, 8)
        );
    }

    #[test]
    fn bounds_are_normalized() {
        let controller = AdaptiveConcurrencyController::new(50, 0, 4);
        assert_eq!(controller.min_concurrency(), 1);
        assert_eq!(controller.current(), 4);
    }

    #[test]
    fn concurrent_records_keep_level_in_bounds() {
        let controller = Arc::new(AdaptiveConcurrencyController::new(2, 1, 8));
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    for i in 0..200 {
                        controller.record((i + worker) % 3 != 0);
                        let level = controller.current();
                        assert!((1..=8).contains(&level));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!((1..=8).contains(&controller.current()));
    }
}
