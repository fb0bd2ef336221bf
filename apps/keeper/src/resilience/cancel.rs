use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Cooperative cancellation signal.
///
/// Clones share one signal. A child token is cancelled together with its
/// parent but can also be cancelled on its own without touching the parent.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    state: watch::Sender<bool>,
    children: Mutex<Vec<Arc<TokenInner>>>,
}

impl TokenInner {
    fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.state.send_replace(true) {
            return;
        }
        let children = {
            let mut guard = self.children.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for child in children {
            child.cancel();
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// A token that is cancelled when `self` is, or when cancelled directly.
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken::new();
        {
            let mut children = self.inner.children.lock().unwrap_or_else(|e| e.into_inner());
            if !self.is_cancelled() {
                // Cancelled children have nothing left to propagate.
                children.retain(|c| !*c.state.borrow());
                children.push(Arc::clone(&child.inner));
                return child;
            }
        }
        child.cancel();
        child
    }

    /// Resolves once the token is cancelled; immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
