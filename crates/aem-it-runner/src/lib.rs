// aem-it-runner: CI stage orchestration for AEM CIF integration tests.
// Depends on `aem-it-sdk` for process invocation and shared utilities.
//
// Flow:
//   main → StageConfig::load → stage::run
//     → maven::resolve_versions → quickstart bind/start → suites → quickstart stop
//     → collect::Collector (always) → summary::RunSummary

pub mod collect;
pub mod config;
pub mod maven;
pub mod quickstart;
pub mod stage;
pub mod suites;
pub mod summary;
