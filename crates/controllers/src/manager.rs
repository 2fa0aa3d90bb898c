//! In-process driver: fans watch deltas out to reconciliation requests,
//! coalesces them and runs each through its controller's reconciler.
//!
//! Requests run one at a time, so at most one reconciliation per resource is
//! ever in flight. Failed requests go to the back of the queue until their
//! attempt budget is spent.

use std::collections::VecDeque;

use metrics::counter;
use roster_core::{Delta, DeltaKind, Resource, ResourceId};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::controller::Controller;
use crate::runtime::{Request, Runtime};

/// (controller index, resource)
type Key = (usize, ResourceId);

/// Pending requests keyed by controller and resource, FIFO. Pushing a key that
/// is already pending keeps its position.
#[derive(Default)]
pub struct RequestQueue {
    attempts: FxHashMap<Key, u32>,
    order: VecDeque<Key>,
}

impl RequestQueue {
    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Returns false when the key was already pending.
    pub fn push(&mut self, key: Key) -> bool {
        self.push_attempt(key, 0)
    }

    fn push_attempt(&mut self, key: Key, attempts: u32) -> bool {
        if self.attempts.contains_key(&key) {
            return false;
        }
        self.attempts.insert(key.clone(), attempts);
        self.order.push_back(key);
        true
    }

    /// Next request with the number of attempts already spent on it.
    pub fn pop(&mut self) -> Option<(Key, u32)> {
        let key = self.order.pop_front()?;
        let attempts = self.attempts.remove(&key).unwrap_or(0);
        Some((key, attempts))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Reconciliations that returned Ok.
    pub reconciled: usize,
    /// Attempts that returned an error.
    pub failed: usize,
    /// Requests given up on after `max_attempts`.
    pub dropped: usize,
    pub cancelled: bool,
    /// Stopped at `max_rounds` with work still pending.
    pub exhausted: bool,
}

impl RunSummary {
    fn merge(&mut self, other: RunSummary) {
        self.reconciled += other.reconciled;
        self.failed += other.failed;
        self.dropped += other.dropped;
        self.cancelled |= other.cancelled;
        self.exhausted |= other.exhausted;
    }
}

pub struct Manager {
    controllers: Vec<Controller>,
    config: ManagerConfig,
    queue: RequestQueue,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        Self { controllers: Vec::new(), config, queue: RequestQueue::default() }
    }

    pub fn register(&mut self, controller: Controller) {
        info!(controller = controller.name(), primary = %controller.primary_type(), "registered controller");
        self.controllers.push(controller);
    }

    pub fn controllers(&self) -> &[Controller] { &self.controllers }
    pub fn config(&self) -> &ManagerConfig { &self.config }
    pub fn pending(&self) -> usize { self.queue.len() }

    /// Every (controller name, request) a delta fans out to.
    pub fn requests_for(&self, delta: &Delta) -> Vec<(&'static str, Request)> {
        self.controllers.iter().flat_map(|c| c.requests_for(delta).into_iter().map(move |r| (c.name(), r))).collect()
    }

    /// Queue the requests a delta fans out to. Returns how many were new.
    pub fn enqueue(&mut self, delta: &Delta) -> usize {
        let mut added = 0usize;
        for (idx, c) in self.controllers.iter().enumerate() {
            for req in c.requests_for(delta) {
                if self.queue.push((idx, req.id)) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Queue `res` as if it had just been applied. Used to resync state that
    /// existed before the delta subscription.
    pub fn enqueue_existing(&mut self, res: &Resource) -> usize {
        self.enqueue(&Delta { kind: DeltaKind::Applied, resource: res.clone() })
    }

    fn drain(&mut self, rx: &mut UnboundedReceiver<Delta>) {
        while let Ok(delta) = rx.try_recv() {
            self.enqueue(&delta);
        }
    }

    /// Process requests until the queue and the delta channel are both empty.
    pub async fn run_until_idle(&mut self, cx: &CancellationToken, rt: &Runtime, rx: &mut UnboundedReceiver<Delta>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut rounds = 0usize;
        loop {
            self.drain(rx);
            if cx.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let Some(((idx, id), attempts)) = self.queue.pop() else { break };
            if rounds >= self.config.max_rounds {
                self.queue.push_attempt((idx, id), attempts);
                summary.exhausted = true;
                warn!(max_rounds = self.config.max_rounds, pending = self.queue.len(), "manager: round limit reached");
                break;
            }
            rounds += 1;

            let controller = &self.controllers[idx];
            let name = controller.name();
            let req = Request::new(id);
            match controller.reconciler().reconcile(cx, rt, &req).await {
                Ok(()) => {
                    summary.reconciled += 1;
                    counter!("reconcile_total", 1u64, "controller" => name, "outcome" => "ok");
                }
                Err(e) if e.is_cancelled() => {
                    counter!("reconcile_total", 1u64, "controller" => name, "outcome" => "cancelled");
                    // interrupted, not failed: keep it pending at the same attempt count
                    self.queue.push_attempt((idx, req.id), attempts);
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    summary.failed += 1;
                    counter!("reconcile_total", 1u64, "controller" => name, "outcome" => "error");
                    let spent = attempts + 1;
                    if spent >= self.config.max_attempts {
                        summary.dropped += 1;
                        warn!(controller = name, id = %req.id, attempts = spent, error = %e, "reconcile failed; giving up");
                    } else {
                        debug!(controller = name, id = %req.id, attempts = spent, error = %e, "reconcile failed; requeued");
                        self.queue.push_attempt((idx, req.id), spent);
                    }
                }
            }
        }
        debug!(reconciled = summary.reconciled, failed = summary.failed, rounds, "manager: idle");
        summary
    }

    /// Run until cancelled or the delta channel closes.
    pub async fn run(&mut self, cx: &CancellationToken, rt: &Runtime, mut rx: UnboundedReceiver<Delta>) -> RunSummary {
        let mut total = RunSummary::default();
        loop {
            total.merge(self.run_until_idle(cx, rt, &mut rx).await);
            if total.cancelled {
                break;
            }
            tokio::select! {
                biased;
                _ = cx.cancelled() => {
                    total.cancelled = true;
                    break;
                }
                maybe = rx.recv() => match maybe {
                    Some(delta) => { self.enqueue(&delta); }
                    None => {
                        debug!("delta channel closed; draining and exiting manager loop");
                        total.merge(self.run_until_idle(cx, rt, &mut rx).await);
                        break;
                    }
                }
            }
        }
        info!(reconciled = total.reconciled, failed = total.failed, dropped = total.dropped, "manager stopped");
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::catalog::service_type;
    use roster_core::Tenancy;

    fn key(idx: usize, name: &str) -> Key {
        (idx, ResourceId::new(service_type(), Tenancy::default(), name))
    }

    #[test]
    fn queue_coalesces_in_fifo_order() {
        let mut q = RequestQueue::default();
        assert!(q.push(key(0, "a")));
        assert!(q.push(key(0, "b")));
        assert!(!q.push(key(0, "a")));
        assert!(q.push(key(1, "a")));
        assert_eq!(q.len(), 3);
        let order: Vec<Key> = std::iter::from_fn(|| q.pop().map(|(k, _)| k)).collect();
        assert_eq!(order, vec![key(0, "a"), key(0, "b"), key(1, "a")]);
        assert!(q.is_empty());
    }

    #[test]
    fn requeue_keeps_attempts() {
        let mut q = RequestQueue::default();
        q.push_attempt(key(0, "a"), 2);
        assert!(!q.push(key(0, "a")));
        assert_eq!(q.pop(), Some((key(0, "a"), 2)));
    }
}
