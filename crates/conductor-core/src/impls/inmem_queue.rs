//! InMemoryWorkQueue - プロセス内の FIFO
//!
//! - tokio Mutex<VecDeque> + Notify
//! - ロックは push / pop の中で完結する（ロックを跨いで await しない）

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::ports::{WorkItem, WorkQueue};

/// Unbounded in-memory FIFO shared by all pump loops.
#[derive(Default)]
pub struct InMemoryWorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    notify: Notify,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn push(&self, item: WorkItem) {
        self.items.lock().await.push_back(item);
        // 待機中の pump loop を 1 つ起こす（いなければ permit が残る）
        self.notify.notify_one();
    }

    async fn pop(&self, timeout: Duration) -> Option<WorkItem> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    // まだ残っていれば次の待機者へバトンを渡す
                    if !items.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use std::sync::Arc;
    use ulid::Ulid;

    fn item(worker: &str) -> WorkItem {
        WorkItem::new(worker, TaskId::from_ulid(Ulid::new()))
    }

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let queue = InMemoryWorkQueue::new();
        let first = item("w1");
        let second = item("w2");
        queue.push(first.clone()).await;
        queue.push(second.clone()).await;
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.pop(Duration::from_secs(1)).await, Some(first));
        assert_eq!(queue.pop(Duration::from_secs(1)).await, Some(second));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let queue = InMemoryWorkQueue::new();
        let start = Instant::now();
        let popped = queue.pop(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn push_wakes_pop() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let expected = item("w1");

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop(Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.push(expected.clone()).await;

        assert_eq!(waiter.await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn every_item_is_popped_exactly_once_by_competing_consumers() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        for _ in 0..20 {
            queue.push(item("w1")).await;
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(item) = queue.pop(Duration::from_millis(50)).await {
                    got.push(item.task_id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);
        assert!(queue.is_empty().await);
    }
}
