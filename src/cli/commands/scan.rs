use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use astsentry_analyzer::{AstJob, BatchError, BatchRunner, BatchSummary, CancellationFlag};
use astsentry_core::Rule;
use astsentry_parser::AstReader;
use astsentry_reports::{JsonLinesReporter, Reporter, SarifReporter, TextReporter};
use astsentry_rules::{RuleRegistry, RuleSelection};
use astsentry_utils::{AstDiscovery, read_filelist};

use crate::cli::args::{OutputFormat, ScanArgs, validate_scan_args};
use crate::cli::{EXIT_FAILURES, EXIT_INTERRUPTED};
use crate::config::AstsentryConfig;

pub async fn run_scan_command(args: ScanArgs) -> Result<ExitCode> {
    let env_vars: HashMap<String, String> = std::env::vars().collect();
    let config = AstsentryConfig::load_with_precedence(args.config.as_deref(), &args, &env_vars)
        .context("Invalid configuration")?;
    validate_scan_args(&args, config.paths.filelist.is_some())?;

    let selection = RuleSelection {
        enable: config.enabled_rules().to_vec(),
        disable: config.disabled_rules().to_vec(),
    };
    let rules = RuleRegistry::builtin().select(&selection)?;
    if rules.is_empty() {
        log::warn!("Every rule is disabled, no findings will be reported");
    }

    let ast_paths = collect_ast_paths(&args.targets, config.paths.filelist.as_deref())?;
    let source_root = config
        .paths
        .source_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let jobs: Vec<AstJob> = ast_paths
        .into_iter()
        .map(|ast_path| AstJob::new(ast_path, &source_root))
        .collect();
    log::info!(
        "Found {} AST files, resolving sources against {}",
        jobs.len(),
        source_root.display()
    );

    let sink = open_sink(config.scan.output.as_deref())?;
    let mut reporter = build_reporter(config.format(), sink, &rules, &source_root);

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted by user, finishing trees in flight");
            on_interrupt.cancel();
        }
    });

    let mut runner = BatchRunner::new(rules, Arc::new(AstReader::new()))
        .with_jobs(config.jobs())
        .with_cancellation(cancel);
    if jobs.len() > 1 && !args.quiet && std::io::stderr().is_terminal() {
        runner = runner.with_progress(progress_bar(jobs.len()));
    }

    let summary = match runner.run(jobs, reporter.as_mut()).await {
        Ok(summary) => summary,
        Err(BatchError::Report {
            ast_path,
            source,
            summary,
        }) => {
            eprintln!(
                "❌ Could not write findings for {}: {}",
                ast_path.display(),
                source
            );
            print_summary(&summary, args.quiet);
            return Ok(ExitCode::from(EXIT_FAILURES));
        }
    };

    reporter.run_completed(summary.trees_scanned == summary.trees_total);
    if let Err(e) = reporter.finish() {
        eprintln!("❌ Could not finish report: {}", e);
        return Ok(ExitCode::from(EXIT_FAILURES));
    }
    print_summary(&summary, args.quiet);

    Ok(ExitCode::from(exit_status(&summary)))
}

/// AST paths from every target, then from the filelist, in that order.
fn collect_ast_paths(targets: &[PathBuf], filelist: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for target in targets {
        paths.extend(
            AstDiscovery::new(target)
                .discover()
                .with_context(|| format!("Failed to enumerate {}", target.display()))?,
        );
    }
    if let Some(filelist) = filelist {
        paths.extend(read_filelist(filelist)?);
    }
    Ok(paths)
}

fn open_sink(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory {}", parent.display())
                })?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}

fn build_reporter(
    format: OutputFormat,
    sink: Box<dyn Write>,
    rules: &[Box<dyn Rule>],
    source_root: &Path,
) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Text => Box::new(TextReporter::new(sink)),
        OutputFormat::Json => Box::new(JsonLinesReporter::new(sink)),
        OutputFormat::Sarif => Box::new(
            SarifReporter::new(sink, rules)
                .with_source_root(resolved_root(source_root))
                .with_tool_version(env!("CARGO_PKG_VERSION")),
        ),
    }
}

/// Findings carry canonical paths when the sources exist, so the root used to
/// shorten SARIF URIs has to be canonical too.
fn resolved_root(source_root: &Path) -> PathBuf {
    std::fs::canonicalize(source_root).unwrap_or_else(|_| source_root.to_path_buf())
}

fn progress_bar(total: usize) -> ProgressBar {
    let progress_bar = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        progress_bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    progress_bar
}

fn print_summary(summary: &BatchSummary, quiet: bool) {
    if quiet {
        return;
    }

    eprintln!(
        "Scanned {} of {} trees: {} findings, {} failed",
        summary.trees_scanned,
        summary.trees_total,
        summary.findings,
        summary.failures.len()
    );
    for failure in &summary.failures {
        eprintln!(
            "  ⚠️  {} ({}): {}",
            failure.ast_path.display(),
            failure.stage,
            failure.reason
        );
    }
}

fn exit_status(summary: &BatchSummary) -> u8 {
    if summary.cancelled {
        EXIT_INTERRUPTED
    } else if summary.has_failures() {
        EXIT_FAILURES
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astsentry_analyzer::{FailureStage, TreeFailure};
    use tempfile::TempDir;

    #[test]
    fn test_exit_status() {
        let mut summary = BatchSummary {
            trees_total: 2,
            trees_scanned: 2,
            ..Default::default()
        };
        assert_eq!(exit_status(&summary), 0);

        summary.trees_scanned = 1;
        summary.failures.push(TreeFailure {
            ast_path: PathBuf::from("a.ast.json"),
            stage: FailureStage::Load,
            reason: "missing".to_string(),
        });
        assert_eq!(exit_status(&summary), EXIT_FAILURES);

        summary.cancelled = true;
        assert_eq!(exit_status(&summary), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_collect_ast_paths_keeps_target_then_filelist_order() {
        let temp_dir = TempDir::new().unwrap();
        let ast_dir = temp_dir.path().join("ast");
        std::fs::create_dir(&ast_dir).unwrap();
        std::fs::write(ast_dir.join("b.php.ast.json"), "{}").unwrap();
        std::fs::write(ast_dir.join("a.php.ast.json"), "{}").unwrap();
        let list = temp_dir.path().join("extra.list");
        std::fs::write(&list, "other/c.php.ast.json\n").unwrap();

        let paths = collect_ast_paths(&[ast_dir.clone()], Some(&list)).unwrap();
        assert_eq!(
            paths,
            vec![
                ast_dir.join("a.php.ast.json"),
                ast_dir.join("b.php.ast.json"),
                temp_dir.path().join("other/c.php.ast.json"),
            ]
        );
    }

    #[test]
    fn test_open_sink_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("reports/findings.txt");

        let mut sink = open_sink(Some(&output)).unwrap();
        writeln!(sink, "hello").unwrap();
        drop(sink);

        assert_eq!(std::fs::read_to_string(output).unwrap(), "hello\n");
    }
}
