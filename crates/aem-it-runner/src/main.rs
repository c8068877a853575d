// Entry point for the `it-tests` stage binary.
//
// Reads TYPE / AEM / BROWSER / JACOCO_AGENT (and optional path overrides)
// from the environment, runs the stage, and exits non-zero on failure.

use clap::Parser;
use std::path::PathBuf;

use aem_it_runner::config::{PathOverrides, StageConfig};
use aem_it_runner::stage;

#[derive(Parser, Debug)]
#[command(name = "it-tests", about = "AEM CIF integration-test CI stage runner")]
struct Args {
    /// Quickstart-packaging tool directory (overrides QP_PATH).
    #[arg(long)]
    qp_path: Option<PathBuf>,

    /// Project checkout directory (overrides BUILD_PATH).
    #[arg(long)]
    build_path: Option<PathBuf>,

    /// Directory where test-reports/ and logs/ are written.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    let exit_code = runtime.block_on(run(args));
    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let overrides = PathOverrides {
        qp_path: args.qp_path,
        build_path: args.build_path,
        work_dir: args.work_dir,
    };

    let config = match StageConfig::load(&overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid stage configuration: {e}");
            return 2;
        }
    };

    tracing::info!(
        "Starting integration-test stage: type={:?}, distribution={}, browser={}",
        config.test_type,
        config.distribution.classifier(),
        config.browser
    );

    match stage::run(&config).await {
        Ok(()) => {
            tracing::info!("Stage completed.");
            0
        }
        Err(e) => {
            tracing::error!("Stage failed: {e:#}");
            1
        }
    }
}
