use scry_core::constants::DEFAULT_SCORE_GAP_RATIO;

/// Cuts a score-sorted list at the first sharp relative drop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreGap {
    /// `cur / prev` below this marks the cut.
    pub ratio: f64,
}

impl Default for ScoreGap {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_SCORE_GAP_RATIO,
        }
    }
}

impl ScoreGap {
    /// Keep `items[..cut]`, never fewer than `min_results` (or all items when
    /// there are fewer). Pairs are compared from index `max(min_results, 1)`.
    pub fn truncate<T>(
        &self,
        mut items: Vec<T>,
        min_results: usize,
        score_fn: impl Fn(&T) -> f64,
    ) -> Vec<T> {
        if items.len() <= min_results {
            return items;
        }
        let start = min_results.max(1);
        let cut = (start..items.len())
            .find(|&idx| {
                let prev = score_fn(&items[idx - 1]);
                let cur = score_fn(&items[idx]);
                prev > 0.0 && cur / prev < self.ratio
            })
            .unwrap_or(items.len());
        items.truncate(cut.max(min_results));
        items
    }
}

/// Truncation floor for a request of `limit` results: never more than asked for.
pub fn truncation_floor(min_results: usize, limit: usize) -> usize {
    min_results.min(limit)
}
