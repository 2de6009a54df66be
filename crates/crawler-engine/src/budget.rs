use std::sync::atomic::{AtomicU64, Ordering};

/// Gates the global page budget at dequeue time, independent of the public
/// `pages_processed` metric (which only advances once a URL reaches a
/// terminal state). Several workers can pass the gate in the same instant
/// the budget is exhausted, which is why `pages_processed` is only bounded
/// by `MaxPages + MaxConcurrency`, not `MaxPages` exactly.
pub struct BudgetGate {
    dispatched: AtomicU64,
    max_pages: u64,
}

impl BudgetGate {
    pub fn new(max_pages: u64) -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            max_pages,
        }
    }

    pub fn try_reserve(&self) -> bool {
        let prior = self.dispatched.fetch_add(1, Ordering::SeqCst);
        prior < self.max_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_pages() {
        let gate = BudgetGate::new(2);
        assert!(gate.try_reserve());
        assert!(gate.try_reserve());
        assert!(!gate.try_reserve());
    }
}
