use tokio::sync::watch;

/// Number of objects that have been added but have not reached a terminal outcome.
///
/// Incremented once per unique OID and decremented once per terminal success or failure;
/// retries in flight leave it untouched.
#[derive(Debug)]
pub(crate) struct PendingCount {
    tx: watch::Sender<usize>,
}

impl PendingCount {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn add(&self, n: usize) {
        self.tx.send_modify(|c| *c += n);
    }

    pub fn done(&self) {
        self.tx.send_modify(|c| {
            debug_assert!(*c > 0, "pending count decremented below zero");
            *c = c.saturating_sub(1);
        });
    }

    pub fn get(&self) -> usize {
        *self.tx.borrow()
    }

    /// Resolves once the count reaches zero.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_returns_immediately_at_zero() {
        let pending = PendingCount::new();
        pending.wait().await;
        assert_eq!(pending.get(), 0);
    }

    #[tokio::test]
    async fn test_wait_until_all_done() {
        let pending = Arc::new(PendingCount::new());
        pending.add(3);

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait().await })
        };

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(!waiter.is_finished());
            pending.done();
        }

        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
        assert_eq!(pending.get(), 0);
    }
}
