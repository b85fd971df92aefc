//! # Named, origin-scoped mutual exclusion.
//!
//! [`LockService`] is the capability the leader election is built on: a named
//! lock that at most one context holds at a time. Holding is represented by a
//! [`Lease`]; the lock is free again as soon as the lease is released or dropped.
//!
//! [`LocalLocks`] is the in-process implementation: one single-permit
//! [`Semaphore`] per lock name. Waiters are served FIFO, and a pending
//! `acquire` that is aborted (or whose future is dropped) leaves the wait queue
//! immediately, so an aborted contender never lingers. A name's entry is
//! dropped from the table once nobody holds or waits for it.
//!
//! ```text
//! ctx A: acquire("sse-lock") ──► granted ──► Lease held ........ release()
//! ctx B: acquire("sse-lock") ──► waiting ────────────────────────► granted
//! ctx C: acquire("sse-lock") ──► waiting ──► abort.cancel() ──► Err(Aborted)
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::LockError;

/// Proof of holding a named lock.
///
/// Dropping the lease releases the lock; [`Lease::release`] does the same
/// explicitly.
pub struct Lease {
    name: Arc<str>,
    _guard: Box<dyn Any + Send + Sync>,
}

impl Lease {
    /// Wraps an implementation-specific guard whose drop frees the lock.
    pub fn new(name: impl Into<Arc<str>>, guard: impl Any + Send + Sync) -> Self {
        Self {
            name: name.into(),
            _guard: Box::new(guard),
        }
    }

    /// Name of the held lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases the lock, promoting the next waiter (if any).
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("name", &self.name).finish()
    }
}

/// Named lock capability shared by every context of an origin.
#[async_trait]
pub trait LockService: Send + Sync + 'static {
    /// Waits until the lock `name` is granted.
    ///
    /// Returns `Err(LockError::Aborted)` if `abort` fires first; the request is
    /// withdrawn and no lease is ever produced for it.
    async fn acquire(&self, name: &str, abort: &CancellationToken) -> Result<Lease, LockError>;

    /// Grants the lock only if it is free right now.
    fn try_acquire(&self, name: &str) -> Option<Lease>;

    /// True while some lease for `name` is outstanding.
    fn is_held(&self, name: &str) -> bool;
}

type Table = Arc<DashMap<String, Arc<Semaphore>>>;

/// Forgets `name` if the table holds the only reference to its semaphore.
///
/// Holders and waiters each keep a clone, so a count of one means the lock is
/// idle. The check runs under the shard lock, so no new clone can race it.
fn prune(table: &DashMap<String, Arc<Semaphore>>, name: &str) {
    table.remove_if(name, |_, sem| Arc::strong_count(sem) == 1);
}

/// Guard stored in a [`Lease`] handed out by [`LocalLocks`].
struct LocalGuard {
    permit: Option<OwnedSemaphorePermit>,
    table: Table,
    name: String,
}

impl Drop for LocalGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        prune(&self.table, &self.name);
    }
}

/// In-process [`LockService`] backed by one single-permit semaphore per name.
#[derive(Default)]
pub struct LocalLocks {
    locks: Table,
}

impl LocalLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lock names currently held or waited for.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    fn semaphore(&self, name: &str) -> Arc<Semaphore> {
        let entry = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)));
        Arc::clone(entry.value())
    }

    fn lease(&self, name: &str, permit: OwnedSemaphorePermit) -> Lease {
        Lease::new(
            name,
            LocalGuard {
                permit: Some(permit),
                table: Arc::clone(&self.locks),
                name: name.to_string(),
            },
        )
    }
}

#[async_trait]
impl LockService for LocalLocks {
    async fn acquire(&self, name: &str, abort: &CancellationToken) -> Result<Lease, LockError> {
        let sem = self.semaphore(name);

        let res = tokio::select! {
            biased;
            _ = abort.cancelled() => Err(LockError::Aborted { name: name.to_string() }),
            res = sem.acquire_owned() => match res {
                Ok(permit) => Ok(self.lease(name, permit)),
                Err(_closed) => Err(LockError::Closed { name: name.to_string() }),
            },
        };
        if res.is_err() {
            prune(&self.locks, name);
        }
        res
    }

    fn try_acquire(&self, name: &str) -> Option<Lease> {
        let permit = self.semaphore(name).try_acquire_owned().ok()?;
        Some(self.lease(name, permit))
    }

    fn is_held(&self, name: &str) -> bool {
        self.locks
            .get(name)
            .map(|sem| sem.available_permits() == 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_request_waits_until_release() {
        let locks = Arc::new(LocalLocks::new());
        let abort = CancellationToken::new();

        let first = locks.acquire("L", &abort).await.expect("free lock");
        assert!(locks.is_held("L"));
        assert!(locks.try_acquire("L").is_none());

        let waiter = {
            let locks = Arc::clone(&locks);
            let abort = abort.clone();
            tokio::spawn(async move { locks.acquire("L", &abort).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.release();
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("promoted in time")
            .expect("join")
            .expect("granted");
        assert_eq!(second.name(), "L");
    }

    #[tokio::test]
    async fn aborted_request_leaves_no_waiter_behind() {
        let locks = Arc::new(LocalLocks::new());
        let holder = locks.try_acquire("L").expect("free lock");

        let abort = CancellationToken::new();
        let pending = {
            let locks = Arc::clone(&locks);
            let abort = abort.clone();
            tokio::spawn(async move { locks.acquire("L", &abort).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abort.cancel();

        let res = pending.await.expect("join");
        assert!(matches!(res, Err(LockError::Aborted { .. })));

        holder.release();
        assert!(!locks.is_held("L"));
        assert!(locks.try_acquire("L").is_some());
    }

    #[tokio::test]
    async fn already_cancelled_token_never_grants() {
        let locks = LocalLocks::new();
        let abort = CancellationToken::new();
        abort.cancel();

        let res = locks.acquire("free", &abort).await;
        assert!(res.unwrap_err().is_abort());
        assert!(!locks.is_held("free"));
    }

    #[test]
    fn lock_names_are_independent() {
        let locks = LocalLocks::new();
        let a = locks.try_acquire("a");
        let b = locks.try_acquire("b");
        assert!(a.is_some() && b.is_some());
        assert!(!locks.is_held("c"));
    }

    #[tokio::test]
    async fn idle_names_are_pruned() {
        let locks = Arc::new(LocalLocks::new());
        let holder = locks.try_acquire("L").expect("free lock");
        assert_eq!(locks.lock_count(), 1);

        let abort = CancellationToken::new();
        let pending = {
            let locks = Arc::clone(&locks);
            let abort = abort.clone();
            tokio::spawn(async move { locks.acquire("L", &abort).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abort.cancel();
        assert!(pending.await.expect("join").is_err());
        assert_eq!(locks.lock_count(), 1);

        holder.release();
        assert_eq!(locks.lock_count(), 0);

        let never = CancellationToken::new();
        never.cancel();
        assert!(locks.acquire("M", &never).await.is_err());
        assert_eq!(locks.lock_count(), 0);
    }

    #[tokio::test]
    async fn handover_keeps_entry_until_last_release() {
        let locks = Arc::new(LocalLocks::new());
        let abort = CancellationToken::new();
        let first = locks.acquire("L", &abort).await.expect("free lock");
        let waiter = {
            let locks = Arc::clone(&locks);
            let abort = abort.clone();
            tokio::spawn(async move { locks.acquire("L", &abort).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        first.release();
        let second = waiter.await.expect("join").expect("granted");
        assert!(locks.is_held("L"));
        assert_eq!(locks.lock_count(), 1);

        drop(second);
        assert_eq!(locks.lock_count(), 0);
    }
}
