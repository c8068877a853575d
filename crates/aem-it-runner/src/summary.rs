// Machine-readable run summary, written next to the collected reports so the
// CI system can surface the stage outcome without parsing logs.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collect::CollectionReport;
use crate::config::{Distribution, StageConfig, TestType};
use crate::maven::Versions;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub outcome: &'static str,
    /// First main-phase error, when the stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub test_type: Option<TestType>,
    pub distribution: Distribution,
    pub browser: String,
    /// Resolved build versions; absent when resolution itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collection: CollectionReport,
}

impl RunSummary {
    pub fn new(
        config: &StageConfig,
        versions: Option<Versions>,
        main_result: &anyhow::Result<()>,
        collection: &CollectionReport,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            outcome: if main_result.is_ok() { "success" } else { "failure" },
            failure: main_result.as_ref().err().map(|e| format!("{e:#}")),
            test_type: config.test_type,
            distribution: config.distribution,
            browser: config.browser.clone(),
            versions,
            started_at,
            finished_at,
            collection: collection.clone(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathOverrides, StageConfig};

    fn config() -> StageConfig {
        let vars = [
            ("TYPE", "selenium"),
            ("AEM", "cloud"),
            ("BROWSER", "chrome"),
            ("JACOCO_AGENT", "/opt/jacoco/agent.jar"),
        ];
        StageConfig::from_lookup(&PathOverrides::default(), |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    fn versions() -> Versions {
        Versions {
            project: "1.0.0".into(),
            cif_components: "2.6.0-SNAPSHOT".into(),
            wcm_components: "2.17.0".into(),
            graphql_client: "1.7.1".into(),
            connector: crate::config::CONNECTOR_VERSION.into(),
        }
    }

    #[test]
    fn successful_run_serializes_without_failure_field() {
        let summary = RunSummary::new(
            &config(),
            Some(versions()),
            &Ok(()),
            &CollectionReport::default(),
            Utc::now(),
            Utc::now(),
        );
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["outcome"], "success");
        assert_eq!(json["test_type"], "selenium");
        assert_eq!(json["distribution"], "cloud");
        assert_eq!(json["versions"]["connector"], "1.8.0-magento242ee");
        assert!(json.get("failure").is_none());
    }

    #[test]
    fn failed_run_records_the_error() {
        let summary = RunSummary::new(
            &config(),
            None,
            &Err(anyhow::anyhow!("bind refused")),
            &CollectionReport::default(),
            Utc::now(),
            Utc::now(),
        );
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["failure"], "bind refused");
        assert!(json.get("versions").is_none());
    }

    #[test]
    fn write_produces_a_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-summary.json");
        let summary = RunSummary::new(
            &config(),
            Some(versions()),
            &Ok(()),
            &CollectionReport::default(),
            Utc::now(),
            Utc::now(),
        );
        summary.write(&path).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["outcome"], "success");
    }
}
