//! Sequential task queue for batch operations
//!
//! Every page render, font fetch or page re-encode is one task. Tasks run
//! one at a time; after each the progress callback fires, and before each
//! the cancel token is checked.

use crate::error::{PdfEditError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress callback: `(completed, total, message)`
pub type ProgressCallback<'a> = Box<dyn FnMut(usize, usize, &str) + 'a>;

/// Shared flag a host can set to stop a running batch
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct TaskQueue<'a> {
    total: usize,
    completed: usize,
    progress: Option<ProgressCallback<'a>>,
    cancel: Option<CancelToken>,
}

impl<'a> TaskQueue<'a> {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, callback: impl FnMut(usize, usize, &str) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn with_optional_progress(mut self, callback: Option<ProgressCallback<'a>>) -> Self {
        self.progress = callback;
        self
    }

    pub fn with_cancel(mut self, token: Option<CancelToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Grow the expected task count (e.g. once font lookups are known)
    pub fn add_tasks(&mut self, count: usize) {
        self.total += count;
    }

    /// Run one task. Fails with `Cancelled` if the token was set before it started.
    pub fn run<T>(&mut self, message: &str, task: impl FnOnce() -> Result<T>) -> Result<T> {
        self.check_cancelled()?;
        let out = task()?;
        self.completed += 1;
        if let Some(progress) = self.progress.as_mut() {
            progress(self.completed, self.total.max(self.completed), message);
        }
        Ok(out)
    }

    pub fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(PdfEditError::Cancelled),
            _ => Ok(()),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reported_after_each_task() {
        let mut seen = Vec::new();
        {
            let mut queue = TaskQueue::new(3).with_progress(|done, total, msg: &str| {
                seen.push((done, total, msg.to_string()));
            });
            for i in 0..3 {
                queue.run(&format!("page {}", i + 1), || Ok(())).unwrap();
            }
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], (3, 3, "page 3".to_string()));
    }

    #[test]
    fn test_cancel_stops_before_next_task() {
        let token = CancelToken::new();
        let mut queue = TaskQueue::new(3).with_cancel(Some(token.clone()));
        let mut ran = 0;
        queue
            .run("first", || {
                ran += 1;
                Ok(())
            })
            .unwrap();
        token.cancel();
        let result = queue.run("second", || {
            ran += 1;
            Ok(())
        });
        assert!(matches!(result, Err(PdfEditError::Cancelled)));
        assert_eq!(ran, 1);
    }

    #[test]
    fn test_task_error_propagates() {
        let mut queue = TaskQueue::new(1);
        let result: Result<()> =
            queue.run("fails", || Err(PdfEditError::Compression("boom".into())));
        assert!(result.is_err());
        assert_eq!(queue.completed(), 0);
    }
}
