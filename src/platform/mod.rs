//! Platform abstraction layer
//!
//! Handles browser/native differences for the wall clock used by step
//! deadlines. Simulation time never comes from here; only frame budgeting
//! does.

/// Milliseconds of wall-clock time since an arbitrary fixed origin.
///
/// Monotonic within one process. Native uses `Instant`, the browser build
/// uses `Performance.now()`.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_secs_f64() * 1000.0
}

/// Milliseconds of wall-clock time since an arbitrary fixed origin.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

/// Wall-clock budget for one `World::step` call.
///
/// `Unlimited` is for tests and headless runs; `Until` carries a `now_ms`
/// deadline from the frame scheduler.
#[derive(Debug, Clone, Copy)]
pub enum StepBudget {
    /// Process every due event regardless of wall-clock cost.
    Unlimited,
    /// Stop dispatching once `now_ms()` passes this value.
    Until(f64),
}

impl StepBudget {
    /// Budget that expires `ms` from now.
    pub fn millis_from_now(ms: f64) -> Self {
        StepBudget::Until(now_ms() + ms)
    }

    /// True once the budget is spent.
    pub fn expired(&self) -> bool {
        match self {
            StepBudget::Unlimited => false,
            StepBudget::Until(deadline) => now_ms() > *deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_monotonic() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_unlimited_budget_never_expires() {
        assert!(!StepBudget::Unlimited.expired());
    }

    #[test]
    fn test_past_deadline_expired() {
        let budget = StepBudget::Until(now_ms() - 1.0);
        assert!(budget.expired());
    }
}
