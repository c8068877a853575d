// Test suite invocation: the server-side integration suite and the Selenium
// UI suite. Which one runs is decided by the stage configuration; with no
// suite configured, the instance is only started and stopped.

use aem_it_sdk::{CommandLine, ProcessInvoker};
use anyhow::{Context, Result};

use crate::config::{StageConfig, TestType};
use crate::maven::Maven;

/// Extract the version token from `chromedriver --version` output, e.g.
/// `ChromeDriver 80.0.3987.16 (320f6526c...)` yields `80.0.3987.16`.
/// Output with fewer than two fields yields an empty string.
pub fn chromedriver_version_token(output: &str) -> String {
    output
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

/// Query the installed ChromeDriver for its version token.
async fn chromedriver_version(invoker: &ProcessInvoker) -> Result<String> {
    let program = which::which("chromedriver").context("chromedriver not found on PATH")?;
    let output = invoker
        .execute_capture(&CommandLine::new(program.to_string_lossy()).arg("--version"))
        .await
        .context("Failed to query the ChromeDriver version")?;
    Ok(chromedriver_version_token(&output))
}

/// Run the suite selected by the configuration.
pub async fn run_suite(
    config: &StageConfig,
    maven: &Maven,
    invoker: &ProcessInvoker,
) -> Result<()> {
    match config.test_type {
        Some(TestType::Integration) => run_integration(config, maven, invoker).await,
        Some(TestType::Selenium) => run_selenium(config, maven, invoker).await,
        None => {
            tracing::info!("No test suite configured; skipping.");
            Ok(())
        }
    }
}

/// Server-side integration tests, run against the local instance with the
/// distribution profile. The `local` profile comes from the AEM archetype.
async fn run_integration(
    config: &StageConfig,
    maven: &Maven,
    invoker: &ProcessInvoker,
) -> Result<()> {
    let dir = config.build_path.join("it.tests");
    let cmd = maven.verify_cmd(&dir, &["local", config.distribution.classifier()]);
    invoker
        .execute(&cmd)
        .await
        .context("Integration test suite failed")
}

/// Selenium UI tests, parameterized with the installed ChromeDriver version
/// and the configured browser.
async fn run_selenium(
    config: &StageConfig,
    maven: &Maven,
    invoker: &ProcessInvoker,
) -> Result<()> {
    let driver_version = chromedriver_version(invoker).await?;
    tracing::info!("Using ChromeDriver {driver_version}");

    let dir = config.build_path.join("ui.tests");
    let cmd = maven.test_cmd(
        &dir,
        "ui-tests-local-execution",
        &[
            ("HEADLESS_BROWSER", "true"),
            ("SELENIUM-BROWSER", &config.browser),
        ],
        &[("CHROMEDRIVER", &driver_version)],
    );
    invoker.execute(&cmd).await.context("Selenium test suite failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_token_is_the_second_field() {
        let output = "ChromeDriver 80.0.3987.16 \
                      (320f6526c1632ad4f205ebce69b99a062ed78647-refs/branch-heads/3987@{#185})";
        assert_eq!(chromedriver_version_token(output), "80.0.3987.16");
    }

    #[test]
    fn short_output_yields_an_empty_token() {
        assert_eq!(chromedriver_version_token("ChromeDriver"), "");
        assert_eq!(chromedriver_version_token(""), "");
    }
}
