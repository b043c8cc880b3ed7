//! Outcome of one reconcile pass

use std::time::Duration;

use kube::runtime::controller::Action;

/// Either done, or "come back after this long"
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    /// A zero delay counts as done.
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay).filter(|d| !d.is_zero()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.requeue_after.is_none()
    }

    pub fn delay(&self) -> Option<Duration> {
        self.requeue_after
    }

    /// Combine two sub-step results, keeping the sooner requeue.
    pub fn merge(self, other: Self) -> Self {
        let requeue_after = match (self.requeue_after, other.requeue_after) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { requeue_after }
    }

    pub fn into_action(self) -> Action {
        match self.requeue_after {
            Some(d) => Action::requeue(d),
            None => Action::await_change(),
        }
    }
}
