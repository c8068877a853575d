// Stage orchestration: the strictly sequential main phase, followed by the
// collection phase which runs exactly once on every exit path. The first
// main-phase error short-circuits the remaining main-phase steps and is what
// the stage ultimately reports; collection failures never mask it.

use std::path::PathBuf;
use std::sync::Arc;

use aem_it_sdk::{ProcessInvoker, TracingTraceWriter};
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::collect::Collector;
use crate::config::StageConfig;
use crate::maven::{self, Maven, Versions};
use crate::quickstart::{
    self, Installable, Quickstart, StartSpec, AUTHOR_PORT, INSTANCE_ID,
};
use crate::suites;
use crate::summary::RunSummary;

/// Run the whole stage: main phase, then collection.
pub async fn run(config: &StageConfig) -> Result<()> {
    let invoker = ProcessInvoker::new(Arc::new(TracingTraceWriter));
    let started_at = Utc::now();

    let mut versions = None;
    let main_result = run_main(config, &invoker, &mut versions).await;

    let collector = Collector::new(config);
    finish(config, &collector, versions, main_result, started_at).await
}

/// The path of the application "all" package for this build.
pub fn all_package_path(config: &StageConfig, project_version: &str) -> PathBuf {
    config.build_path.join("all/target").join(format!(
        "venia.all-{}-{}.zip",
        project_version,
        config.distribution.classifier()
    ))
}

/// Main phase, aborting on the first error. Resolved versions are handed back
/// through `versions_out` so the run summary has them even when a later step
/// fails.
async fn run_main(
    config: &StageConfig,
    invoker: &ProcessInvoker,
    versions_out: &mut Option<Versions>,
) -> Result<()> {
    let maven = Maven::locate()?;

    let versions = maven::resolve_versions(&maven, invoker, &config.build_path).await?;
    tracing::info!(
        "Resolved versions: project={}, cif={}, wcm={}, graphql-client={}, connector={}",
        versions.project,
        versions.cif_components,
        versions.wcm_components,
        versions.graphql_client,
        versions.connector
    );
    *versions_out = Some(versions.clone());

    let qp = Quickstart::new(&config.qp_path);
    qp.bind(invoker).await?;

    let download = quickstart::addon_download(config.distribution, &config.build_path);
    let settings = config.build_path.join(".circleci/settings.xml");
    let addon_file = maven
        .download_artifact(invoker, &config.build_path, &settings, &download)
        .await?;

    let mut installs = vec![quickstart::sling_junit_bundle()];
    installs.extend(quickstart::distribution_extras(
        config.distribution,
        &addon_file,
        &versions.wcm_components,
    ));
    installs.push(quickstart::examples_bundle(
        &config.build_path,
        &versions.cif_components,
    ));
    installs.push(Installable::File(all_package_path(config, &versions.project)));

    let spec = StartSpec {
        runmode: INSTANCE_ID.to_string(),
        port: AUTHOR_PORT,
        qs_jar: qp.quickstart_jar(),
        installs,
        vm_options: quickstart::vm_options(&config.jacoco_agent),
    };
    qp.start(invoker, &spec).await?;

    suites::run_suite(config, &maven, invoker).await?;

    qp.stop(invoker).await
}

/// Collection phase plus the stage verdict. Public so tests can inject a
/// failed main phase and assert that collection still runs.
pub async fn finish(
    config: &StageConfig,
    collector: &Collector,
    versions: Option<Versions>,
    main_result: Result<()>,
    started_at: DateTime<Utc>,
) -> Result<()> {
    if let Err(ref e) = main_result {
        tracing::error!("Stage failed: {e:#}");
    }

    let collection = collector.collect(config.test_type).await;

    let summary = RunSummary::new(
        config,
        versions,
        &main_result,
        &collection,
        started_at,
        Utc::now(),
    );
    if let Err(e) = summary.write(&collector.test_reports_dir().join("run-summary.json")) {
        tracing::warn!("Failed to write run summary: {e:#}");
    }

    main_result?;
    if collection.failed() {
        anyhow::bail!("One or more collection steps failed");
    }
    Ok(())
}
