//! Applies the engine across a corpus of serialized trees.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use astsentry_core::{Finding, Rule, Tree};
use astsentry_parser::AstReader;
use astsentry_reports::{ReportError, Reporter};
use futures::{StreamExt, future, stream};
use indicatif::ProgressBar;
use serde::Serialize;

use crate::engine;

/// Where a tree comes from and what its filenames are relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstJob {
    pub ast_path: PathBuf,
    pub source_root: PathBuf,
}

impl AstJob {
    pub fn new(ast_path: impl Into<PathBuf>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            ast_path: ast_path.into(),
            source_root: source_root.into(),
        }
    }
}

/// Turns an AST path into a tree handle.
pub trait TreeSource: Send + Sync {
    fn load(&self, ast_path: &Path) -> Result<Box<dyn Tree>>;
}

impl TreeSource for AstReader {
    fn load(&self, ast_path: &Path) -> Result<Box<dyn Tree>> {
        Ok(Box::new(self.read_ast(ast_path)?))
    }
}

/// Shared stop signal. Once set, no further trees are dispatched; trees
/// already being walked finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The AST file could not be read or decoded.
    Load,
    /// The walk hit `UnknownNode` or `MalformedTree`.
    Traversal,
    /// The worker running the tree panicked.
    Worker,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Load => write!(f, "load"),
            FailureStage::Traversal => write!(f, "traversal"),
            FailureStage::Worker => write!(f, "worker"),
        }
    }
}

/// One tree that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeFailure {
    pub ast_path: PathBuf,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub trees_total: usize,
    pub trees_scanned: usize,
    pub findings: usize,
    pub failures: Vec<TreeFailure>,
    /// Dispatch stopped before every tree was processed.
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn trees_processed(&self) -> usize {
        self.trees_scanned + self.failures.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The reporter rejected a finding. Findings emitted before stay emitted.
    #[error("failed to report findings for {}: {source}", .ast_path.display())]
    Report {
        ast_path: PathBuf,
        #[source]
        source: ReportError,
        summary: Box<BatchSummary>,
    },
}

enum TreeOutcome {
    Scanned {
        ast_path: PathBuf,
        findings: Vec<Finding>,
    },
    Failed(TreeFailure),
}

/// Runs a fixed rule set over many trees, one tree per worker.
pub struct BatchRunner {
    rules: Arc<[Box<dyn Rule>]>,
    source: Arc<dyn TreeSource>,
    jobs: usize,
    cancel: CancellationFlag,
    progress: Option<ProgressBar>,
}

impl BatchRunner {
    pub fn new(rules: Vec<Box<dyn Rule>>, source: Arc<dyn TreeSource>) -> Self {
        Self {
            rules: Arc::from(rules),
            source,
            jobs: 1,
            cancel: CancellationFlag::new(),
            progress: None,
        }
    }

    /// Number of trees walked concurrently. Values below 1 are treated as 1.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn rules(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    /// Process `jobs` in order, emitting each tree's findings as one block.
    ///
    /// Trees are loaded and walked on the blocking pool, `jobs` at a time, so
    /// the calling task never runs a walk itself. Tree failures are recorded
    /// in the summary and do not stop the run.
    pub async fn run(
        &self,
        jobs: Vec<AstJob>,
        reporter: &mut dyn Reporter,
    ) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary {
            trees_total: jobs.len(),
            ..Default::default()
        };
        log::info!(
            "Scanning {} trees with {} rules on {} workers",
            jobs.len(),
            self.rules.len(),
            self.jobs
        );

        let cancel = self.cancel.clone();
        let mut outcomes = stream::iter(jobs)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(|job| {
                let rules = Arc::clone(&self.rules);
                let source = Arc::clone(&self.source);
                async move {
                    let ast_path = job.ast_path.clone();
                    tokio::task::spawn_blocking(move || scan_tree(&job, source.as_ref(), &rules))
                        .await
                        .unwrap_or_else(|err| {
                            TreeOutcome::Failed(TreeFailure {
                                ast_path,
                                stage: FailureStage::Worker,
                                reason: err.to_string(),
                            })
                        })
                }
            })
            .buffered(self.jobs);

        while let Some(outcome) = outcomes.next().await {
            self.record(outcome, reporter, &mut summary)?;
        }

        self.finish(summary)
    }

    /// Process `jobs` one after another on the calling thread.
    pub fn run_sequential(
        &self,
        jobs: &[AstJob],
        reporter: &mut dyn Reporter,
    ) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary {
            trees_total: jobs.len(),
            ..Default::default()
        };
        log::info!(
            "Scanning {} trees with {} rules",
            jobs.len(),
            self.rules.len()
        );

        for job in jobs {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = scan_tree(job, self.source.as_ref(), &self.rules);
            self.record(outcome, reporter, &mut summary)?;
        }

        self.finish(summary)
    }

    fn record(
        &self,
        outcome: TreeOutcome,
        reporter: &mut dyn Reporter,
        summary: &mut BatchSummary,
    ) -> Result<(), BatchError> {
        match outcome {
            TreeOutcome::Scanned { ast_path, findings } => {
                for finding in &findings {
                    if let Err(source) = reporter.emit(finding) {
                        return Err(BatchError::Report {
                            ast_path,
                            source,
                            summary: Box::new(std::mem::take(summary)),
                        });
                    }
                    summary.findings += 1;
                }
                log::debug!("{}: {} findings", ast_path.display(), findings.len());
                summary.trees_scanned += 1;
            }
            TreeOutcome::Failed(failure) => {
                log::warn!(
                    "Skipping {} ({} failed): {}",
                    failure.ast_path.display(),
                    failure.stage,
                    failure.reason
                );
                summary.failures.push(failure);
            }
        }

        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        Ok(())
    }

    fn finish(&self, mut summary: BatchSummary) -> Result<BatchSummary, BatchError> {
        summary.cancelled = summary.trees_processed() < summary.trees_total;
        if summary.cancelled {
            log::warn!(
                "Run cancelled after {} of {} trees",
                summary.trees_processed(),
                summary.trees_total
            );
        }
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        Ok(summary)
    }
}

/// Load one tree, walk it, and resolve finding paths against the job's root.
fn scan_tree(job: &AstJob, source: &dyn TreeSource, rules: &[Box<dyn Rule>]) -> TreeOutcome {
    let failed = |stage, reason| {
        TreeOutcome::Failed(TreeFailure {
            ast_path: job.ast_path.clone(),
            stage,
            reason,
        })
    };

    let tree = match source.load(&job.ast_path) {
        Ok(tree) => tree,
        Err(err) => return failed(FailureStage::Load, err.to_string()),
    };

    match engine::run(tree.as_ref(), rules) {
        Ok(findings) => TreeOutcome::Scanned {
            ast_path: job.ast_path.clone(),
            findings: findings
                .iter()
                .map(|finding| finding.resolved_against(&job.source_root))
                .collect(),
        },
        Err(err) => failed(FailureStage::Traversal, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astsentry_parser::{AstBuilder, JsonAst, NodeId};
    use astsentry_rules::RuleRegistry;
    use std::collections::HashMap;

    /// Trees keyed by AST path; any other path fails to load.
    #[derive(Default)]
    struct MemorySource {
        trees: HashMap<PathBuf, JsonAst>,
    }

    impl MemorySource {
        fn with(mut self, ast_path: &str, tree: JsonAst) -> Self {
            self.trees.insert(PathBuf::from(ast_path), tree);
            self
        }
    }

    impl TreeSource for MemorySource {
        fn load(&self, ast_path: &Path) -> Result<Box<dyn Tree>> {
            match self.trees.get(ast_path) {
                Some(tree) => Ok(Box::new(tree.clone())),
                None => anyhow::bail!("no such AST: {}", ast_path.display()),
            }
        }
    }

    #[derive(Default)]
    struct Collect {
        findings: Vec<Finding>,
        fail_after: Option<usize>,
    }

    impl Reporter for Collect {
        fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
            if self.fail_after == Some(self.findings.len()) {
                return Err(ReportError::Sink(std::io::Error::other("disk full")));
            }
            self.findings.push(finding.clone());
            Ok(())
        }
    }

    /// A file with one `mysql_query` call per given line.
    fn db_tree(filename: &str, lines: &[usize]) -> JsonAst {
        let mut builder = AstBuilder::new(filename);
        let calls: Vec<NodeId> = lines
            .iter()
            .map(|&line| builder.leaf("FunctionCall", Some("mysql_query"), line))
            .collect();
        let root = builder.node("Start", None, 1, &calls);
        builder.build(root)
    }

    fn runner(source: MemorySource) -> BatchRunner {
        let rules = RuleRegistry::builtin().select(&Default::default()).unwrap();
        BatchRunner::new(rules, Arc::new(source))
    }

    fn jobs(paths: &[&str]) -> Vec<AstJob> {
        paths
            .iter()
            .map(|path| AstJob::new(*path, "/srv/site"))
            .collect()
    }

    #[test]
    fn test_load_failures_do_not_stop_the_batch() {
        let source = MemorySource::default()
            .with("a.ast.json", db_tree("a.php", &[3]))
            .with("c.ast.json", db_tree("c.php", &[7, 9]));
        let mut reporter = Collect::default();

        let summary = runner(source)
            .run_sequential(
                &jobs(&["missing-1.ast.json", "a.ast.json", "missing-2.ast.json", "c.ast.json"]),
                &mut reporter,
            )
            .unwrap();

        assert_eq!(summary.trees_total, 4);
        assert_eq!(summary.trees_scanned, 2);
        assert_eq!(summary.findings, 3);
        assert_eq!(summary.failures.len(), 2);
        assert!(summary.failures.iter().all(|f| f.stage == FailureStage::Load));
        assert_eq!(
            summary.failures[0].ast_path,
            PathBuf::from("missing-1.ast.json")
        );
        assert!(!summary.cancelled);

        let files: Vec<_> = reporter.findings.iter().map(|f| f.file()).collect();
        assert_eq!(
            files,
            vec![
                Path::new("/srv/site/a.php"),
                Path::new("/srv/site/c.php"),
                Path::new("/srv/site/c.php"),
            ]
        );
    }

    #[test]
    fn test_traversal_failure_is_recorded() {
        let mut builder = AstBuilder::new("broken.php");
        let root = builder.node("Start", None, 1, &[NodeId(41)]);
        let source = MemorySource::default()
            .with("broken.ast.json", builder.build(root))
            .with("ok.ast.json", db_tree("ok.php", &[2]));
        let mut reporter = Collect::default();

        let summary = runner(source)
            .run_sequential(&jobs(&["broken.ast.json", "ok.ast.json"]), &mut reporter)
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].stage, FailureStage::Traversal);
        assert!(summary.failures[0].reason.contains("unknown node #41"));
        assert!(summary.failures[0].reason.contains("broken.php"));
        assert_eq!(reporter.findings.len(), 1);
    }

    #[test]
    fn test_sink_failure_aborts_with_summary() {
        let source = MemorySource::default()
            .with("a.ast.json", db_tree("a.php", &[1, 2]))
            .with("b.ast.json", db_tree("b.php", &[3]));
        let mut reporter = Collect {
            fail_after: Some(1),
            ..Default::default()
        };

        let err = runner(source)
            .run_sequential(&jobs(&["a.ast.json", "b.ast.json"]), &mut reporter)
            .unwrap_err();

        let BatchError::Report {
            ast_path, summary, ..
        } = err;
        assert_eq!(ast_path, PathBuf::from("a.ast.json"));
        assert_eq!(summary.findings, 1);
        assert_eq!(reporter.findings.len(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let source = MemorySource::default().with("a.ast.json", db_tree("a.php", &[1]));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let mut reporter = Collect::default();

        let summary = runner(source)
            .with_cancellation(cancel)
            .run_sequential(&jobs(&["a.ast.json"]), &mut reporter)
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.trees_processed(), 0);
        assert!(reporter.findings.is_empty());
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let mut source = MemorySource::default();
        let mut paths = Vec::new();
        for i in 0..24 {
            let path = format!("f{i}.ast.json");
            if i % 5 != 3 {
                let lines: Vec<usize> = (1..=(i % 4 + 1)).collect();
                source = source.with(&path, db_tree(&format!("f{i}.php"), &lines));
            }
            paths.push(path);
        }
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        let runner = runner(source);

        let mut sequential = Collect::default();
        let expected = runner
            .run_sequential(&jobs(&paths), &mut sequential)
            .unwrap();

        let runner = runner.with_jobs(4);
        let mut parallel = Collect::default();
        let actual = runner.run(jobs(&paths), &mut parallel).await.unwrap();

        assert_eq!(actual, expected);
        assert_eq!(parallel.findings, sequential.findings);
    }

    /// Records the thread each load runs on; every load fails.
    #[derive(Default)]
    struct LoadThreads(std::sync::Mutex<Vec<std::thread::ThreadId>>);

    impl TreeSource for LoadThreads {
        fn load(&self, ast_path: &Path) -> Result<Box<dyn Tree>> {
            self.0.lock().unwrap().push(std::thread::current().id());
            anyhow::bail!("no such AST: {}", ast_path.display())
        }
    }

    #[tokio::test]
    async fn test_single_worker_run_stays_off_the_async_thread() {
        let threads = Arc::new(LoadThreads::default());
        let rules = RuleRegistry::builtin().select(&Default::default()).unwrap();
        let runner = BatchRunner::new(rules, threads.clone());
        let mut reporter = Collect::default();

        let summary = runner
            .run(jobs(&["a.ast.json", "b.ast.json"]), &mut reporter)
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 2);
        let loaded_on = threads.0.lock().unwrap();
        assert_eq!(loaded_on.len(), 2);
        assert!(loaded_on.iter().all(|id| *id != std::thread::current().id()));
    }

    #[tokio::test]
    async fn test_parallel_cancelled_dispatches_nothing() {
        let source = MemorySource::default().with("a.ast.json", db_tree("a.php", &[1]));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let mut reporter = Collect::default();

        let summary = runner(source)
            .with_jobs(2)
            .with_cancellation(cancel)
            .run(jobs(&["a.ast.json", "a.ast.json"]), &mut reporter)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.trees_processed(), 0);
    }
}
