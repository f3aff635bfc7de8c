/// Monotonic failure counter with an edge-triggered threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorBudget {
    count: u32,
    threshold: u32,
    tripped: bool,
}

impl ErrorBudget {
    /// A zero threshold is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
            tripped: false,
        }
    }

    /// Counts one failure. Returns `true` only on the call that first reaches the threshold.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if !self.tripped && self.count >= self.threshold {
            self.tripped = true;
            return true;
        }
        false
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_exhausted(&self) -> bool {
        self.tripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_at_threshold() {
        let mut budget = ErrorBudget::new(3);
        assert!(!budget.record());
        assert!(!budget.record());
        assert!(budget.record());
        assert!(!budget.record());
        assert_eq!(budget.count(), 4);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn zero_threshold_trips_on_first_failure() {
        let mut budget = ErrorBudget::new(0);
        assert_eq!(budget.threshold(), 1);
        assert!(budget.record());
    }
}
