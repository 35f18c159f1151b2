use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::client::{HttpResponse, RequestSpec};
use crate::errors::ApiError;

pub(crate) type Settlement = Result<HttpResponse, ApiError>;

/// A request suspended while its credential is renewed. Settled exactly once
/// through the oneshot half held by the waiting caller.
pub(crate) struct PendingRequest {
    pub spec: RequestSpec,
    pub tx: oneshot::Sender<Settlement>,
}

impl PendingRequest {
    pub fn settle(self, outcome: Settlement) {
        // The receiver may have been dropped; nothing left to do then.
        let _ = self.tx.send(outcome);
    }
}

struct RefreshState {
    is_refreshing: bool,
    queue: VecDeque<PendingRequest>,
}

/// Single-flight bookkeeping for one client instance. Every mutation happens
/// under one lock acquisition with no await inside, so enqueueing interest
/// and electing the driver are atomic with respect to other tasks.
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState {
                is_refreshing: false,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Registers interest in the next refresh cycle. Returns the settlement
    /// handle and whether the caller was elected to drive the refresh call.
    /// At most one caller per cycle drives; the rest only wait.
    pub fn enqueue(&self, spec: RequestSpec) -> (oneshot::Receiver<Settlement>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.queue.push_back(PendingRequest { spec, tx });
        let drive = !state.is_refreshing;
        if drive {
            state.is_refreshing = true;
            debug!("starting refresh cycle");
        } else {
            debug!(queued = state.queue.len(), "refresh already in flight; queued");
        }
        (rx, drive)
    }

    /// Ends the in-flight cycle: clears the flag and hands back the whole
    /// queue in arrival order. Requests enqueued from here on belong to a new
    /// cycle.
    pub fn complete(&self) -> VecDeque<PendingRequest> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.is_refreshing = false;
        std::mem::take(&mut state.queue)
    }

    #[cfg(test)]
    fn is_refreshing(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_refreshing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn spec(path: &str) -> RequestSpec {
        RequestSpec::new(Method::GET, path)
    }

    #[test]
    fn first_waiter_drives_the_rest_only_wait() {
        let coordinator = RefreshCoordinator::new();
        let (_rx_a, drive_a) = coordinator.enqueue(spec("/a"));
        let (_rx_b, drive_b) = coordinator.enqueue(spec("/b"));
        let (_rx_c, drive_c) = coordinator.enqueue(spec("/c"));
        assert!(drive_a);
        assert!(!drive_b);
        assert!(!drive_c);
        assert!(coordinator.is_refreshing());
    }

    #[test]
    fn complete_drains_fifo_and_ends_the_cycle() {
        let coordinator = RefreshCoordinator::new();
        let (_rx_a, _) = coordinator.enqueue(spec("/a"));
        let (_rx_b, _) = coordinator.enqueue(spec("/b"));
        let (_rx_c, _) = coordinator.enqueue(spec("/c"));

        let drained = coordinator.complete();
        let order: Vec<_> = drained.iter().map(|p| p.spec.path.clone()).collect();
        assert_eq!(order, ["/a", "/b", "/c"]);
        assert!(!coordinator.is_refreshing());
        assert!(coordinator.complete().is_empty());
    }

    #[test]
    fn arrival_after_completion_starts_a_fresh_cycle() {
        let coordinator = RefreshCoordinator::new();
        let (_rx_a, drive_a) = coordinator.enqueue(spec("/a"));
        assert!(drive_a);
        let drained = coordinator.complete();
        assert_eq!(drained.len(), 1);

        // A request that just missed the finished cycle must trigger exactly
        // one new refresh, not attach to the old one and not be dropped.
        let (_rx_b, drive_b) = coordinator.enqueue(spec("/b"));
        assert!(drive_b);
        assert_eq!(coordinator.complete().len(), 1);
    }

    #[tokio::test]
    async fn settlement_is_delivered_exactly_once() {
        let coordinator = RefreshCoordinator::new();
        let (rx, _) = coordinator.enqueue(spec("/a"));
        let mut drained = coordinator.complete();
        let pending = drained.pop_front().expect("one entry");
        pending.settle(Err(ApiError::MissingRefreshToken));
        let settled = rx.await.expect("settled");
        assert!(matches!(settled, Err(ApiError::MissingRefreshToken)));
    }
}
