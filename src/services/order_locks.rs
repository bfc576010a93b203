use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-order async mutexes serializing receptions against the same order.
///
/// Entries are created on first use and dropped again once nobody holds or
/// waits on them.
#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Held for the duration of a reception. Releases the order on drop.
#[derive(Debug)]
pub struct OrderLockGuard {
    order_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl OrderLockGuard {
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, order_id: Uuid) -> OrderLockGuard {
        let lock = self
            .locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        OrderLockGuard {
            order_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Drops the entry for `order_id` if no guard or waiter still references it.
    pub fn release_idle(&self, order_id: Uuid) {
        self.locks
            .remove_if(&order_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_order_is_serialized() {
        let locks = Arc::new(OrderLocks::new());
        let order_id = Uuid::new_v4();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(order_id).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_orders_do_not_block_each_other() {
        let locks = OrderLocks::new();
        let first = locks.acquire(Uuid::new_v4()).await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4()))
            .await
            .expect("second order should lock immediately");

        assert_ne!(first.order_id(), second.order_id());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_released() {
        let locks = OrderLocks::new();
        let order_id = Uuid::new_v4();

        let guard = locks.acquire(order_id).await;
        locks.release_idle(order_id);
        assert_eq!(locks.len(), 1, "held lock must survive");

        drop(guard);
        locks.release_idle(order_id);
        assert!(locks.is_empty());
    }
}
