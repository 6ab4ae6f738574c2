//! Cancellable, deadline-bound execution scope.
//!
//! One `ExecContext` wraps a whole command run. Child scopes created with
//! `with_timeout` inherit the parent's cancellation and can only shorten its
//! deadline. Long-running external calls poll `state()` and abort once it
//! reports a reason.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::console::Console;
use crate::error::Error;

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Cancelled,
    DeadlineExceeded,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    parent: Option<ExecContext>,
    console: Console,
    trace_id: String,
}

#[derive(Clone)]
pub struct ExecContext {
    inner: Arc<Inner>,
}

impl ExecContext {
    /// Root context writing to the process streams, no deadline.
    pub fn background() -> Self {
        Self::with_console(Console::std())
    }

    pub fn with_console(console: Console) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                timeout: None,
                parent: None,
                console,
                trace_id: uuid::Uuid::new_v4().to_string(),
            }),
        }
    }

    /// Child scope whose deadline is `now + timeout`, clamped to the parent's.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let requested = Instant::now().checked_add(timeout);
        let deadline = match (requested, self.deadline()) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (Some(own), None) => Some(own),
            (None, parent) => parent,
        };
        self.child(deadline, Some(timeout), self.inner.console.clone())
    }

    /// Fresh root scope with this scope's console and trace id. Used for
    /// cleanup that must still run after this scope was cancelled or expired.
    pub fn detached(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                timeout: None,
                parent: None,
                console: self.inner.console.clone(),
                trace_id: self.inner.trace_id.clone(),
            }),
        }
    }

    /// Child scope sharing cancellation and deadline but using another console.
    pub fn with_child_console(&self, console: Console) -> Self {
        self.child(self.inner.deadline, self.inner.timeout, console)
    }

    fn child(&self, deadline: Option<Instant>, timeout: Option<Duration>, console: Console) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                timeout,
                parent: Some(self.clone()),
                console,
                trace_id: self.inner.trace_id.clone(),
            }),
        }
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// `None` while work may continue.
    pub fn state(&self) -> Option<ContextError> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if ctx.inner.cancelled.load(Ordering::SeqCst) {
                return Some(ContextError::Cancelled);
            }
            current = ctx.inner.parent.as_ref();
        }
        match self.deadline() {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail with the context's reason if it is done.
    pub fn check(&self) -> crate::Result<()> {
        match self.state() {
            Some(reason) => Err(self.error_for(reason)),
            None => Ok(()),
        }
    }

    pub fn error_for(&self, reason: ContextError) -> Error {
        match reason {
            ContextError::Cancelled => Error::workflow_cancelled(),
            ContextError::DeadlineExceeded => Error::workflow_timeout(self.inner.timeout),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn console(&self) -> &Console {
        &self.inner.console
    }

    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn background_is_live() {
        let ctx = ExecContext::with_console(Console::captured());
        assert_eq!(ctx.state(), None);
        assert!(ctx.check().is_ok());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn parent_cancellation_reaches_child() {
        let parent = ExecContext::with_console(Console::captured());
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert_eq!(child.state(), Some(ContextError::Cancelled));
        assert_eq!(
            child.check().unwrap_err().code,
            ErrorCode::WorkflowCancelled
        );
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let parent = ExecContext::with_console(Console::captured());
        let child = parent.with_timeout(Duration::from_secs(60));
        child.cancel();
        assert_eq!(parent.state(), None);
    }

    #[test]
    fn zero_timeout_is_expired() {
        let ctx = ExecContext::with_console(Console::captured()).with_timeout(Duration::ZERO);
        assert_eq!(ctx.state(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.check().unwrap_err().code, ErrorCode::WorkflowTimeout);
    }

    #[test]
    fn child_deadline_never_extends_parent() {
        let parent = ExecContext::with_console(Console::captured())
            .with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(3600));
        assert!(child.remaining().unwrap() <= Duration::from_secs(1));
    }

    #[test]
    fn detached_scope_outlives_cancellation() {
        let ctx = ExecContext::with_console(Console::captured()).with_timeout(Duration::ZERO);
        ctx.cancel();
        let detached = ctx.detached();
        assert_eq!(detached.state(), None);
        assert_eq!(detached.trace_id(), ctx.trace_id());
    }

    #[test]
    fn trace_id_is_shared_with_children() {
        let parent = ExecContext::with_console(Console::captured());
        let child = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(parent.trace_id(), child.trace_id());
    }
}
