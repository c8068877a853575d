// Stage configuration. All environment reads happen here, once, producing an
// immutable value the rest of the runner consumes.

use std::path::PathBuf;

use serde::Serialize;

/// Default location of the quickstart-packaging tool checkout.
pub const DEFAULT_QP_PATH: &str = "/home/circleci/cq";
/// Default location of the project checkout.
pub const DEFAULT_BUILD_PATH: &str = "/home/circleci/build";

/// Fixed commerce connector version for this release line.
pub const CONNECTOR_VERSION: &str = "1.8.0-magento242ee";

/// Which test suite this stage invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Integration,
    Selenium,
}

impl TestType {
    /// Parse the `TYPE` environment value. Unknown values yield `None`; the
    /// caller decides whether that warrants a warning.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "integration" => Some(Self::Integration),
            "selenium" => Some(Self::Selenium),
            _ => None,
        }
    }
}

/// AEM distribution under test. Selects which commerce add-on gets installed
/// and which Maven profile the integration suite runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// AEM 6.5 on-premise release.
    Classic,
    /// Cloud SDK.
    Cloud,
}

impl Distribution {
    /// The artifact classifier string, as used in package file names and
    /// Maven profiles.
    pub fn classifier(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Cloud => "cloud",
        }
    }
}

/// Configuration errors reported before any subprocess runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("AEM must be set to 'classic' or 'cloud', got '{0}'")]
    InvalidDistribution(String),

    #[error("AEM is not set; expected 'classic' or 'cloud'")]
    MissingDistribution,

    #[error("JACOCO_AGENT is not set; expected the path to the coverage agent jar")]
    MissingJacocoAgent,
}

/// Command-line overrides for the path settings.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub qp_path: Option<PathBuf>,
    pub build_path: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
}

/// Immutable configuration for one stage invocation.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Suite to run between instance start and stop; `None` runs no suite.
    pub test_type: Option<TestType>,
    pub distribution: Distribution,
    /// Browser name handed to the Selenium suite.
    pub browser: String,
    /// Path to the JaCoCo agent jar injected into the instance JVM.
    pub jacoco_agent: PathBuf,
    /// Directory containing the quickstart-packaging tool (`qp.sh`).
    pub qp_path: PathBuf,
    /// Project checkout directory.
    pub build_path: PathBuf,
    /// Directory where `test-reports/` and `logs/` are produced.
    pub work_dir: PathBuf,
}

impl StageConfig {
    /// Load configuration from the process environment, applying CLI
    /// overrides for the path settings.
    pub fn load(overrides: &PathOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(overrides, |name| std::env::var(name).ok())
    }

    /// Load configuration through an injectable variable lookup. Tests use
    /// this so they never mutate the process environment.
    pub fn from_lookup<F>(overrides: &PathOverrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let test_type = match lookup("TYPE") {
            Some(raw) => {
                let parsed = TestType::parse(&raw);
                if parsed.is_none() {
                    tracing::warn!("Unrecognized TYPE '{}'; no test suite will run.", raw);
                }
                parsed
            }
            None => None,
        };

        let distribution = match lookup("AEM") {
            Some(raw) => match raw.as_str() {
                "classic" => Distribution::Classic,
                "cloud" => Distribution::Cloud,
                other => return Err(ConfigError::InvalidDistribution(other.to_string())),
            },
            None => return Err(ConfigError::MissingDistribution),
        };

        let browser = lookup("BROWSER").unwrap_or_else(|| "chrome".to_string());

        let jacoco_agent = lookup("JACOCO_AGENT")
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingJacocoAgent)?;

        let qp_path = overrides
            .qp_path
            .clone()
            .or_else(|| lookup("QP_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_QP_PATH));

        let build_path = overrides
            .build_path
            .clone()
            .or_else(|| lookup("BUILD_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_PATH));

        let work_dir = overrides
            .work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            test_type,
            distribution,
            browser,
            jacoco_agent,
            qp_path,
            build_path,
            work_dir,
        })
    }
}
