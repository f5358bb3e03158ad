//! Observation of the single shared console session.
//!
//! At most one session is current at a time. Views subscribe when they mount
//! and drop their [`SessionSubscription`] when they unmount.

use super::models::Session;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Holds the current session and notifies observers when it changes.
#[derive(Clone)]
pub struct SessionObserver {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl Default for SessionObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionObserver {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// The session as of now, if anyone is signed in.
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Replaces the current session and wakes every observer.
    pub(crate) fn replace(&self, session: Option<Session>) {
        match &session {
            Some(s) => tracing::debug!(uid = %s.uid, "session established"),
            None => tracing::debug!("session cleared"),
        }
        self.tx.send_replace(session);
    }

    /// A raw receiver for callers that prefer awaiting changes directly.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    /// Invokes `callback` with the current session right away and again after every change.
    ///
    /// Changes that land before the callback runs are coalesced and only the
    /// latest session is delivered. A sign-in quickly followed by a sign-out
    /// may therefore reach the callback as a single `None`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn observe<F>(&self, mut callback: F) -> SessionSubscription
    where
        F: FnMut(Option<Session>) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            let current = rx.borrow_and_update().clone();
            callback(current);
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                callback(current);
            }
        });
        SessionSubscription {
            handle: Some(handle),
        }
    }

    /// Whether the console may be shown.
    pub fn access(&self) -> Access {
        match self.current() {
            Some(session) => Access::Granted(session),
            None => Access::Denied,
        }
    }
}

/// Outcome of gating the console on the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(Session),
    /// Nobody is signed in; the caller should show the login view.
    Denied,
}

/// Keeps a session callback registered. Delivery stops when this is dropped.
#[must_use = "dropping the subscription stops session notifications"]
pub struct SessionSubscription {
    handle: Option<JoinHandle<()>>,
}

impl SessionSubscription {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
