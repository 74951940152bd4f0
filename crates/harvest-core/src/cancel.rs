//! Cancellation token for acquisition requests.
//!
//! A request owns one root token. Each segment group gets a child token so
//! a failed member can stop its siblings without touching the rest of the
//! request, while cancelling the request reaches every group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = match self.children.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cancellation token for cooperative cancellation of async operations.
///
/// Clones share state. Child tokens observe their parent's cancellation,
/// but cancelling a child leaves the parent untouched.
///
/// # Example
///
/// ```
/// use harvest_core::cancel::CancellationToken;
///
/// let request = CancellationToken::new();
/// let group = request.child_token();
///
/// group.cancel();
/// assert!(group.is_cancelled());
/// assert!(!request.is_cancelled());
///
/// let other_group = request.child_token();
/// request.cancel();
/// assert!(other_group.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of this token and all of its children.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Create a child token that is cancelled together with this one.
    pub fn child_token(&self) -> Self {
        let child = CancellationToken::new();
        {
            let mut children = match self.inner.children.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // The parent may have been cancelled before registration completed.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
