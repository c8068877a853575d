// Collection phase: report copies, instance log downloads, and log
// truncation. Runs exactly once after the main phase regardless of its
// outcome. Every step is isolated so one failed copy or download cannot
// prevent the remaining evidence from being collected.

use std::path::PathBuf;

use aem_it_sdk::FsUtil;
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::{StageConfig, TestType};

/// Log files larger than this are truncated in place.
pub const MAX_LOG_BYTES: u64 = 32 * 1024 * 1024;

/// Log files exposed by the web server running inside the instance container.
const LOG_FILES: [&str; 3] = ["error.log", "stdout.log", "stderr.log"];

/// Default address of that web server.
const DEFAULT_LOG_BASE: &str = "http://localhost:3000/crx-quickstart/logs/";

/// Outcome of one collection step.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "status", content = "detail")]
pub enum StepOutcome {
    Ok,
    /// Nothing to do, e.g. a report directory the suite never produced.
    Skipped(String),
    Failed(String),
}

/// One recorded collection step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Everything the collection phase did, for the run summary.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CollectionReport {
    pub steps: Vec<StepReport>,
}

impl CollectionReport {
    fn record(&mut self, name: &str, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Ok => tracing::debug!("Collection step '{name}' done."),
            StepOutcome::Skipped(reason) => {
                tracing::info!("Collection step '{name}' skipped: {reason}")
            }
            StepOutcome::Failed(error) => {
                tracing::warn!("Collection step '{name}' failed: {error}")
            }
        }
        self.steps.push(StepReport {
            name: name.to_string(),
            outcome,
        });
    }

    fn record_result(&mut self, name: &str, result: Result<()>) {
        match result {
            Ok(()) => self.record(name, StepOutcome::Ok),
            Err(e) => self.record(name, StepOutcome::Failed(format!("{e:#}"))),
        }
    }

    /// True if any step failed (skipped steps are not failures).
    pub fn failed(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }
}

/// Collects reports and logs into the work directory.
pub struct Collector {
    work_dir: PathBuf,
    build_path: PathBuf,
    log_base: Url,
    client: reqwest::Client,
}

impl Collector {
    pub fn new(config: &StageConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            build_path: config.build_path.clone(),
            log_base: Url::parse(DEFAULT_LOG_BASE).expect("default log base url is valid"),
            client: reqwest::Client::new(),
        }
    }

    /// Override the log server address. Tests point this at a closed port.
    pub fn with_log_base(mut self, log_base: Url) -> Self {
        self.log_base = log_base;
        self
    }

    pub fn test_reports_dir(&self) -> PathBuf {
        self.work_dir.join("test-reports")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    /// Run all collection steps, recording each outcome.
    pub async fn collect(&self, test_type: Option<TestType>) -> CollectionReport {
        let mut report = CollectionReport::default();

        report.record_result(
            "create test-reports directory",
            FsUtil::ensure_dir(&self.test_reports_dir()),
        );

        match test_type {
            Some(TestType::Integration) => {
                self.copy_reports(
                    &mut report,
                    "copy integration reports",
                    "it.tests/target/failsafe-reports",
                    "it.tests",
                );
            }
            Some(TestType::Selenium) => {
                self.copy_reports(
                    &mut report,
                    "copy selenium reports",
                    "ui.tests/test-module/reports",
                    "ui.tests",
                );
            }
            None => {}
        }

        report.record_result("create logs directory", FsUtil::ensure_dir(&self.logs_dir()));

        for name in LOG_FILES {
            report.record_result(
                &format!("download {name}"),
                self.download_log(name).await,
            );
        }

        report.record_result(
            "truncate oversized logs",
            FsUtil::truncate_logs_over(&self.logs_dir(), MAX_LOG_BYTES).map(|truncated| {
                for path in truncated {
                    tracing::info!("Truncated '{}' to {} bytes.", path.display(), MAX_LOG_BYTES);
                }
            }),
        );

        report
    }

    /// Copy a suite's report tree under `test-reports/`, skipping when the
    /// suite never produced one.
    fn copy_reports(
        &self,
        report: &mut CollectionReport,
        step: &str,
        source: &str,
        dest: &str,
    ) {
        let src = self.build_path.join(source);
        if !src.is_dir() {
            report.record(
                step,
                StepOutcome::Skipped(format!("'{}' not present", src.display())),
            );
            return;
        }
        let result = FsUtil::copy_tree(&src, &self.test_reports_dir().join(dest)).map(|_| ());
        report.record_result(step, result);
    }

    /// Download one log file from the instance into `logs/`. A non-success
    /// status is a download failure.
    async fn download_log(&self, name: &str) -> Result<()> {
        let url = self
            .log_base
            .join(name)
            .with_context(|| format!("Invalid log url for '{name}'"))?;

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("Log server rejected {url}"))?;

        let target = self.logs_dir().join(name);
        let mut file = tokio::fs::File::create(&target)
            .await
            .with_context(|| format!("Failed to create '{}'", target.display()))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write '{}'", target.display()))?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Distribution, PathOverrides, StageConfig};
    use std::fs;
    use std::path::Path;

    fn test_config(work: &Path, build: &Path) -> StageConfig {
        let vars: Vec<(&str, String)> = vec![
            ("TYPE", "integration".into()),
            ("AEM", "classic".into()),
            ("JACOCO_AGENT", "/opt/jacoco/agent.jar".into()),
            ("BUILD_PATH", build.display().to_string()),
        ];
        let overrides = PathOverrides {
            work_dir: Some(work.to_path_buf()),
            ..Default::default()
        };
        StageConfig::from_lookup(&overrides, |name| {
            vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    /// A port from the reserved range, so downloads fail fast.
    fn unreachable_log_base() -> Url {
        Url::parse("http://127.0.0.1:1/crx-quickstart/logs/").unwrap()
    }

    #[tokio::test]
    async fn collects_reports_and_isolates_download_failures() {
        let work = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();

        let reports = build.path().join("it.tests/target/failsafe-reports");
        fs::create_dir_all(&reports).unwrap();
        fs::write(reports.join("TEST-it.SmokeIT.xml"), "<testsuite/>").unwrap();

        let config = test_config(work.path(), build.path());
        let collector = Collector::new(&config).with_log_base(unreachable_log_base());
        let report = collector.collect(config.test_type).await;

        // Reports were copied despite the downloads failing.
        assert!(work
            .path()
            .join("test-reports/it.tests/TEST-it.SmokeIT.xml")
            .is_file());
        assert!(work.path().join("logs").is_dir());

        // The download failures are recorded, not fatal.
        assert!(report.failed());
        let download_steps: Vec<_> = report
            .steps
            .iter()
            .filter(|s| s.name.starts_with("download"))
            .collect();
        assert_eq!(download_steps.len(), 3);
        assert!(download_steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn missing_report_directory_is_skipped_not_failed() {
        let work = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();

        let config = test_config(work.path(), build.path());
        let collector = Collector::new(&config).with_log_base(unreachable_log_base());
        let report = collector.collect(config.test_type).await;

        let copy_step = report
            .steps
            .iter()
            .find(|s| s.name == "copy integration reports")
            .unwrap();
        assert!(matches!(copy_step.outcome, StepOutcome::Skipped(_)));

        // Directories exist either way.
        assert!(work.path().join("test-reports").is_dir());
        assert!(work.path().join("logs").is_dir());
    }

    #[tokio::test]
    async fn no_suite_copies_no_reports() {
        let work = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();

        let mut config = test_config(work.path(), build.path());
        config.test_type = None;
        assert_eq!(config.distribution, Distribution::Classic);

        let collector = Collector::new(&config).with_log_base(unreachable_log_base());
        let report = collector.collect(config.test_type).await;

        assert!(!report.steps.iter().any(|s| s.name.starts_with("copy")));
    }
}
