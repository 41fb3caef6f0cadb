//! Bounded retry counter

/// Result of recording a failure against a [`RetryBudget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    /// Still within budget; carries the current failure count
    Within(u32),
    /// The count went past the maximum
    Exhausted(u32),
}

/// Retry counter with a fixed maximum
///
/// Incremented on each transient failure and reset on success. The budget is
/// exhausted once the count is strictly greater than `max`, so `max = 5`
/// tolerates five failures and gives up on the sixth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    count: u32,
    max: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Record one failure
    pub fn record_failure(&mut self) -> BudgetState {
        self.count = self.count.saturating_add(1);
        if self.count > self.max {
            BudgetState::Exhausted(self.count)
        } else {
            BudgetState::Within(self.count)
        }
    }

    /// Forget all failures
    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.count > self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixth_failure_exhausts() {
        let mut budget = RetryBudget::new(5);
        for i in 1..=5 {
            assert_eq!(budget.record_failure(), BudgetState::Within(i));
        }
        assert_eq!(budget.record_failure(), BudgetState::Exhausted(6));
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_reset_restarts_the_count() {
        let mut budget = RetryBudget::new(5);
        for _ in 0..5 {
            budget.record_failure();
        }
        budget.reset();
        assert_eq!(budget.count(), 0);
        for i in 1..=5 {
            assert_eq!(budget.record_failure(), BudgetState::Within(i));
        }
        assert!(matches!(budget.record_failure(), BudgetState::Exhausted(_)));
    }

    #[test]
    fn test_zero_budget() {
        let mut budget = RetryBudget::new(0);
        assert_eq!(budget.record_failure(), BudgetState::Exhausted(1));
    }
}
