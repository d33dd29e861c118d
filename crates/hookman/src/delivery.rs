//! Ordered delivery lanes for handler fan-outs.
//!
//! Each lane is a task draining an mpsc queue of prepared dispatches and
//! running them one at a time, in the order they were queued. Lifecycle
//! events (`connect`, `disconnect`, `message`, `error`) share one lane;
//! every subscribed topic gets a lane of its own. A slow topic handler
//! holds back later dispatches on its own lane only.
//!
//! Lanes are spawned on first use, so a client can be built outside a
//! runtime. A lane task ends once its sender is dropped and the queue is
//! empty.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// One prepared dispatch.
pub(crate) type Job = BoxFuture<'static, ()>;

/// Which queue a dispatch goes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Lane {
    Lifecycle,
    Topic(String),
}

#[derive(Default)]
pub(crate) struct Delivery {
    lanes: Mutex<HashMap<Lane, mpsc::UnboundedSender<Job>>>,
}

impl Delivery {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `job` behind everything already queued on `lane`.
    pub(crate) fn enqueue(&self, lane: Lane, job: Job) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = lanes
            .entry(lane.clone())
            .or_insert_with(|| spawn_lane(&lane));
        if let Err(mpsc::error::SendError(job)) = tx.send(job) {
            // The lane task is gone (it only stops when its job panics
            // outside a handler); start a fresh one.
            tracing::warn!(?lane, "delivery lane stopped, restarting");
            let tx = spawn_lane(&lane);
            let _ = tx.send(job);
            lanes.insert(lane, tx);
        }
    }

    /// Drops `topic`'s lane. Jobs already queued still run.
    pub(crate) fn retire_topic(&self, topic: &str) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes.remove(&Lane::Topic(topic.to_owned()));
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn spawn_lane(lane: &Lane) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let lane = lane.clone();
    tokio::spawn(async move {
        tracing::trace!(?lane, "delivery lane started");
        while let Some(job) = rx.recv().await {
            job.await;
        }
        tracing::trace!(?lane, "delivery lane stopped");
    });
    tx
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn recording(log: &Arc<Mutex<Vec<u32>>>, n: u32, delay_ms: u64) -> Job {
        let log = Arc::clone(log);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().unwrap().push(n);
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_jobs_on_one_lane_run_in_queue_order() {
        let delivery = Delivery::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..50u32 {
            // Earlier jobs sleep longer; they'd finish last if run concurrently.
            delivery.enqueue(Lane::Lifecycle, recording(&log, n, u64::from(50 - n) / 10));
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        delivery.enqueue(
            Lane::Lifecycle,
            Box::pin(async move {
                let _ = tx.send(());
            }),
        );
        rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_slow_topic_does_not_block_other_lanes() {
        let delivery = Delivery::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        delivery.enqueue(
            Lane::Topic("slow".into()),
            Box::pin(async move {
                let _ = release_rx.await;
            }),
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        delivery.enqueue(
            Lane::Topic("fast".into()),
            Box::pin(async move {
                let _ = tx.send(());
            }),
        );
        tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("fast lane should not wait for the slow one")
            .unwrap();
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_retire_topic_drops_lane() {
        let delivery = Delivery::new();
        delivery.enqueue(Lane::Topic("news".into()), Box::pin(async {}));
        delivery.enqueue(Lane::Lifecycle, Box::pin(async {}));
        assert_eq!(delivery.lane_count(), 2);
        delivery.retire_topic("news");
        assert_eq!(delivery.lane_count(), 1);
    }
}
