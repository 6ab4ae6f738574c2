use crate::error::Result;

type CleanupFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Best-effort cleanup actions, run last-in first-out.
///
/// Actions run on `run_all` or when the stack is dropped, so a workflow that
/// returns early, times out or unwinds from a panic still releases its
/// temporary resources. A failing action is logged and does not stop the
/// remaining ones.
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<(String, CleanupFn)>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.actions.push((label.into(), Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every pending action. Returns the labels of actions that failed.
    pub fn run_all(&mut self) -> Vec<String> {
        let mut failed = Vec::new();
        while let Some((label, action)) = self.actions.pop() {
            match action() {
                Ok(()) => log_status!("cleanup", "{}", label),
                Err(e) => {
                    log_status!("cleanup", "{} failed: {}", label, e.message);
                    failed.push(label);
                }
            }
        }
        failed
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        self.run_all();
    }
}
