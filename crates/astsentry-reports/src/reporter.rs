//! Reporter contract and combinators.

use std::sync::{Arc, Mutex};

use astsentry_core::Finding;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The output sink did not accept the write.
    #[error("output sink failed: {0}")]
    Sink(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("reporter lock poisoned")]
    Poisoned,
}

/// Receives findings in the order they are delivered.
///
/// Implementations must not drop, reorder, or rewrite findings.
pub trait Reporter {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError>;

    /// Whether every tree of the run was processed. Called before `finish`.
    fn run_completed(&mut self, _successful: bool) {}

    /// Flush buffered output. Called once after the last finding.
    fn finish(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
        (**self).emit(finding)
    }

    fn run_completed(&mut self, successful: bool) {
        (**self).run_completed(successful)
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        (**self).finish()
    }
}

/// A reporter behind a mutex, cloneable across threads.
///
/// Each `emit` holds the lock for exactly one finding, so callers that need a
/// file's findings to stay contiguous must emit them from a single task.
#[derive(Clone)]
pub struct SharedReporter {
    inner: Arc<Mutex<dyn Reporter + Send>>,
}

impl SharedReporter {
    pub fn new(reporter: impl Reporter + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reporter)),
        }
    }
}

impl Reporter for SharedReporter {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
        self.inner
            .lock()
            .map_err(|_| ReportError::Poisoned)?
            .emit(finding)
    }

    fn run_completed(&mut self, successful: bool) {
        if let Ok(mut reporter) = self.inner.lock() {
            reporter.run_completed(successful);
        }
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        self.inner.lock().map_err(|_| ReportError::Poisoned)?.finish()
    }
}

/// Forwards every finding to each reporter in turn.
#[derive(Default)]
pub struct FanOut {
    reporters: Vec<Box<dyn Reporter>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for FanOut {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
        for reporter in &mut self.reporters {
            reporter.emit(finding)?;
        }
        Ok(())
    }

    fn run_completed(&mut self, successful: bool) {
        for reporter in &mut self.reporters {
            reporter.run_completed(successful);
        }
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        for reporter in &mut self.reporters {
            reporter.finish()?;
        }
        Ok(())
    }
}
