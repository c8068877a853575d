// Maven command assembly and invocation. Assembly functions are pure so they
// can be tested without Maven installed; only the `async` wrappers spawn the
// real tool.

use std::path::{Path, PathBuf};

use aem_it_sdk::{CommandLine, ProcessInvoker};
use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::CONNECTOR_VERSION;

/// Fully qualified goal of the artifact download plugin.
const DOWNLOAD_PLUGIN_GOAL: &str =
    "com.googlecode.maven-download-plugin:download-maven-plugin:1.6.3:artifact";

/// Version strings resolved from the project build, reported in the run
/// summary and used to assemble install flags.
#[derive(Debug, Clone, Serialize)]
pub struct Versions {
    /// `project.version` of the application under test.
    pub project: String,
    /// `core.cif.components.version`.
    pub cif_components: String,
    /// `core.wcm.components.version`.
    pub wcm_components: String,
    /// `graphql.client.version`.
    pub graphql_client: String,
    /// Fixed commerce connector version for this release line.
    pub connector: String,
}

/// A remote artifact fetched through the download plugin.
#[derive(Debug, Clone)]
pub struct ArtifactDownload {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub artifact_type: String,
    pub classifier: Option<String>,
    pub output_dir: PathBuf,
    pub output_file_name: String,
}

impl ArtifactDownload {
    /// Where the downloaded file lands.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file_name)
    }
}

/// Thin wrapper over the `mvn` executable.
pub struct Maven {
    program: PathBuf,
}

impl Maven {
    /// Resolve `mvn` on PATH.
    pub fn locate() -> Result<Self> {
        let program = which::which("mvn").context("mvn not found on PATH")?;
        Ok(Self { program })
    }

    /// Use an explicit executable path. Tests use this to exercise command
    /// assembly without Maven installed.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> CommandLine {
        CommandLine::new(self.program.to_string_lossy())
    }

    /// `mvn help:evaluate -Dexpression=<expr> -q -DforceStdout` in `dir`.
    pub fn evaluate_cmd(&self, dir: &Path, expression: &str) -> CommandLine {
        self.command()
            .arg("help:evaluate")
            .arg(format!("-Dexpression={expression}"))
            .arg("-q")
            .arg("-DforceStdout")
            .current_dir(dir)
    }

    /// Resolve a single project expression, capturing stdout.
    pub async fn evaluate(
        &self,
        invoker: &ProcessInvoker,
        dir: &Path,
        expression: &str,
    ) -> Result<String> {
        let value = invoker
            .execute_capture(&self.evaluate_cmd(dir, expression))
            .await
            .with_context(|| format!("Failed to evaluate '{expression}'"))?;
        // help:evaluate reports bad expressions on stdout instead of failing.
        if value.is_empty() || value.contains("null object or invalid expression") {
            anyhow::bail!("Expression '{expression}' did not resolve to a value");
        }
        Ok(value)
    }

    /// Download plugin invocation with the artifactory profile and the given
    /// settings file.
    pub fn download_cmd(
        &self,
        dir: &Path,
        settings: &Path,
        download: &ArtifactDownload,
    ) -> CommandLine {
        let mut cmd = self
            .command()
            .arg("-s")
            .arg(settings.to_string_lossy())
            .arg(DOWNLOAD_PLUGIN_GOAL)
            .arg("-Partifactory-cloud")
            .arg(format!("-DgroupId={}", download.group_id))
            .arg(format!("-DartifactId={}", download.artifact_id))
            .arg(format!("-Dversion={}", download.version))
            .arg(format!("-Dtype={}", download.artifact_type));
        if let Some(ref classifier) = download.classifier {
            cmd = cmd.arg(format!("-Dclassifier={classifier}"));
        }
        cmd.arg(format!(
            "-DoutputDirectory={}",
            download.output_dir.display()
        ))
        .arg(format!("-DoutputFileName={}", download.output_file_name))
        .current_dir(dir)
    }

    /// Run the download plugin and return the downloaded file path.
    pub async fn download_artifact(
        &self,
        invoker: &ProcessInvoker,
        dir: &Path,
        settings: &Path,
        download: &ArtifactDownload,
    ) -> Result<PathBuf> {
        invoker
            .execute(&self.download_cmd(dir, settings, download))
            .await
            .with_context(|| {
                format!(
                    "Failed to download {}:{}:{}",
                    download.group_id, download.artifact_id, download.version
                )
            })?;
        Ok(download.output_path())
    }

    /// `mvn clean verify -U -B -P<profiles>` in `dir`.
    pub fn verify_cmd(&self, dir: &Path, profiles: &[&str]) -> CommandLine {
        self.command()
            .arg("clean")
            .arg("verify")
            .arg("-U")
            .arg("-B")
            .arg(format!("-P{}", profiles.join(",")))
            .current_dir(dir)
    }

    /// `mvn test -U -B -P<profile> -D<key>=<value>...` in `dir`, with
    /// environment overrides for the child process.
    pub fn test_cmd(
        &self,
        dir: &Path,
        profile: &str,
        properties: &[(&str, &str)],
        env: &[(&str, &str)],
    ) -> CommandLine {
        let mut cmd = self
            .command()
            .arg("test")
            .arg("-U")
            .arg("-B")
            .arg(format!("-P{profile}"))
            .current_dir(dir);
        for (key, value) in properties {
            cmd = cmd.arg(format!("-D{key}={value}"));
        }
        for (key, value) in env {
            cmd = cmd.env(*key, *value);
        }
        cmd
    }
}

/// Resolve all build-derived versions from the project in `build_path`.
pub async fn resolve_versions(
    maven: &Maven,
    invoker: &ProcessInvoker,
    build_path: &Path,
) -> Result<Versions> {
    let project = maven.evaluate(invoker, build_path, "project.version").await?;
    let cif_components = maven
        .evaluate(invoker, build_path, "core.cif.components.version")
        .await?;
    let wcm_components = maven
        .evaluate(invoker, build_path, "core.wcm.components.version")
        .await?;
    let graphql_client = maven
        .evaluate(invoker, build_path, "graphql.client.version")
        .await?;

    Ok(Versions {
        project,
        cif_components,
        wcm_components,
        graphql_client,
        connector: CONNECTOR_VERSION.to_string(),
    })
}
