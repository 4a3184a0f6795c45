//! Single-resolution signal for in-flight state transitions.
//!
//! A transition has exactly one writer, the task that finishes the node-side work, and any number
//! of waiters. Waiters never influence the writer: dropping a waiter, or the future waiting on
//! it, leaves the writer's work running. If the writer goes away without resolving, every waiter
//! observes [`TransitionOutcome::Closed`].

use tokio::sync::watch;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The value a writer records: success, or the failure message.
pub type TransitionResult = Result<(), String>;

/// The writing half of a transition.
#[derive(Debug)]
pub struct Transition {
    tx: watch::Sender<Option<TransitionResult>>,
}

/// The waiting half of a transition; cheap to clone.
#[derive(Debug, Clone)]
pub struct TransitionWaiter {
    rx: watch::Receiver<Option<TransitionResult>>,
}

/// What a waiter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The writer finished successfully.
    Completed,

    /// The writer recorded a failure.
    Failed(String),

    /// The writer went away without recording anything.
    Closed,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Transition {
    /// Creates a transition and its first waiter.
    pub fn new() -> (Self, TransitionWaiter) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, TransitionWaiter { rx })
    }

    /// Records the outcome. Consumes the writer, so a transition resolves at most once.
    pub fn resolve(self, result: TransitionResult) {
        self.tx.send_replace(Some(result));
    }
}

impl TransitionWaiter {
    /// Waits until the transition resolves or its writer goes away.
    pub async fn wait(&mut self) -> TransitionOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => match value.as_ref() {
                Some(Ok(())) => TransitionOutcome::Completed,
                Some(Err(message)) => TransitionOutcome::Failed(message.clone()),
                None => TransitionOutcome::Closed,
            },
            Err(_) => TransitionOutcome::Closed,
        }
    }

    /// The recorded outcome, if the transition already resolved.
    pub fn peek(&self) -> Option<TransitionResult> {
        self.rx.borrow().clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
