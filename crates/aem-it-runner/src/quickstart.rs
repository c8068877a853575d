// Wrapper over the quickstart-packaging tool (`qp.sh`) plus the install-set
// assembly rules for the commerce add-ons. Install flags are a typed list
// rather than string concatenation, so each distribution's set is explicit.

use std::path::{Path, PathBuf};

use aem_it_sdk::{CommandLine, ProcessInvoker};
use anyhow::{Context, Result};

use crate::config::Distribution;
use crate::maven::ArtifactDownload;

/// Management server the tool binds to.
const SERVER_HOSTNAME: &str = "localhost";
const SERVER_PORT: u16 = 55555;

/// Author instance settings.
pub const INSTANCE_ID: &str = "author";
pub const AUTHOR_PORT: u16 = 4502;

/// One `--install-file` or `--bundle` entry on the start command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installable {
    /// A local package or bundle file, rendered as `--install-file <path>`.
    File(PathBuf),
    /// A remote coordinate, rendered as `--bundle g:a:v:ext`.
    Bundle {
        group: String,
        artifact: String,
        version: String,
        ext: String,
    },
}

impl Installable {
    pub fn bundle(group: &str, artifact: &str, version: &str, ext: &str) -> Self {
        Self::Bundle {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            ext: ext.to_string(),
        }
    }

    /// The flag/value pair this entry contributes to the start command.
    pub fn to_args(&self) -> [String; 2] {
        match self {
            Self::File(path) => ["--install-file".into(), path.display().to_string()],
            Self::Bundle {
                group,
                artifact,
                version,
                ext,
            } => ["--bundle".into(), format!("{group}:{artifact}:{version}:{ext}")],
        }
    }
}

/// The add-on artifact to fetch for a distribution.
pub fn addon_download(distribution: Distribution, build_path: &Path) -> ArtifactDownload {
    let dependencies = build_path.join("dependencies");
    match distribution {
        // Latest add-on build for the AEM 6.5 release.
        Distribution::Classic => ArtifactDownload {
            group_id: "com.adobe.cq.cif".into(),
            artifact_id: "commerce-addon-aem-650-all".into(),
            version: "LATEST".into(),
            artifact_type: "zip".into(),
            classifier: None,
            output_dir: dependencies,
            output_file_name: "addon-650.zip".into(),
        },
        // Latest cloud-ready feature pack.
        Distribution::Cloud => ArtifactDownload {
            group_id: "com.adobe.cq.cif".into(),
            artifact_id: "cif-cloud-ready-feature-pkg".into(),
            version: "LATEST".into(),
            artifact_type: "far".into(),
            classifier: Some("cq-commerce-addon-authorfar".into()),
            output_dir: dependencies,
            output_file_name: "addon.far".into(),
        },
    }
}

/// Install entries specific to the distribution, given the downloaded add-on
/// file. The WCM components package only applies to classic; the Cloud SDK
/// ships with the core components preinstalled.
pub fn distribution_extras(
    distribution: Distribution,
    addon_file: &Path,
    wcm_version: &str,
) -> Vec<Installable> {
    match distribution {
        Distribution::Classic => vec![
            Installable::File(addon_file.to_path_buf()),
            Installable::bundle("com.adobe.cq", "core.wcm.components.all", wcm_version, "zip"),
        ],
        Distribution::Cloud => vec![Installable::File(addon_file.to_path_buf())],
    }
}

/// The CIF examples bundle: a locally built jar for SNAPSHOT versions, the
/// released coordinate otherwise.
pub fn examples_bundle(build_path: &Path, cif_version: &str) -> Installable {
    if cif_version.ends_with("-SNAPSHOT") {
        let jar = format!("core-cif-components-examples-bundle-{cif_version}.jar");
        Installable::File(
            build_path
                .join("dependencies/aem-core-cif-components/examples/bundle/target")
                .join(jar),
        )
    } else {
        Installable::bundle(
            "com.adobe.commerce.cif",
            "core-cif-components-examples-bundle",
            cif_version,
            "jar",
        )
    }
}

/// Sling server-side JUnit support, always installed.
pub fn sling_junit_bundle() -> Installable {
    Installable::bundle("org.apache.sling", "org.apache.sling.junit.core", "1.0.23", "jar")
}

/// JVM options for the author instance, including the coverage agent hook.
pub fn vm_options(jacoco_agent: &Path) -> Vec<String> {
    vec![
        "-Xmx1536m".into(),
        "-XX:MaxPermSize=256m".into(),
        "-Djava.awt.headless=true".into(),
        format!(
            "-javaagent:{}=destfile=crx-quickstart/jacoco-it.exec",
            jacoco_agent.display()
        ),
    ]
}

/// Everything the start command needs.
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub runmode: String,
    pub port: u16,
    pub qs_jar: PathBuf,
    pub installs: Vec<Installable>,
    pub vm_options: Vec<String>,
}

/// Handle on the quickstart-packaging tool checkout.
pub struct Quickstart {
    qp_dir: PathBuf,
}

impl Quickstart {
    pub fn new(qp_dir: impl Into<PathBuf>) -> Self {
        Self { qp_dir: qp_dir.into() }
    }

    /// The author quickstart jar inside this checkout.
    pub fn quickstart_jar(&self) -> PathBuf {
        self.qp_dir.join(INSTANCE_ID).join("cq-quickstart.jar")
    }

    fn command(&self) -> CommandLine {
        CommandLine::new("./qp.sh")
            .arg("-v")
            .current_dir(&self.qp_dir)
    }

    /// Connect to the running management server.
    pub fn bind_cmd(&self) -> CommandLine {
        self.command()
            .arg("bind")
            .arg("--server-hostname")
            .arg(SERVER_HOSTNAME)
            .arg("--server-port")
            .arg(SERVER_PORT.to_string())
    }

    /// Start the author instance with the full install set.
    pub fn start_cmd(&self, spec: &StartSpec) -> CommandLine {
        let mut cmd = self
            .command()
            .arg("start")
            .arg("--id")
            .arg(INSTANCE_ID)
            .arg("--runmode")
            .arg(spec.runmode.as_str())
            .arg("--port")
            .arg(spec.port.to_string())
            .arg("--qs-jar")
            .arg(spec.qs_jar.display().to_string());
        for install in &spec.installs {
            cmd = cmd.args(install.to_args());
        }
        // vm options travel as one argument
        cmd.arg("--vm-options").arg(spec.vm_options.join(" "))
    }

    /// Stop the author instance.
    pub fn stop_cmd(&self) -> CommandLine {
        self.command().arg("stop").arg("--id").arg(INSTANCE_ID)
    }

    pub async fn bind(&self, invoker: &ProcessInvoker) -> Result<()> {
        invoker
            .execute(&self.bind_cmd())
            .await
            .context("Failed to bind to the quickstart management server")
    }

    pub async fn start(&self, invoker: &ProcessInvoker, spec: &StartSpec) -> Result<()> {
        invoker
            .execute(&self.start_cmd(spec))
            .await
            .context("Failed to start the author instance")
    }

    pub async fn stop(&self, invoker: &ProcessInvoker) -> Result<()> {
        invoker
            .execute(&self.stop_cmd())
            .await
            .context("Failed to stop the author instance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD: &str = "/home/circleci/build";

    #[test]
    fn classic_extras_are_the_addon_file_and_the_wcm_package() {
        let download = addon_download(Distribution::Classic, Path::new(BUILD));
        let extras =
            distribution_extras(Distribution::Classic, &download.output_path(), "2.17.0");

        assert_eq!(
            extras,
            vec![
                Installable::File(PathBuf::from(
                    "/home/circleci/build/dependencies/addon-650.zip"
                )),
                Installable::bundle("com.adobe.cq", "core.wcm.components.all", "2.17.0", "zip"),
            ]
        );
        // None of the cloud-specific entries leak in.
        let args: Vec<String> = extras.iter().flat_map(|i| i.to_args()).collect();
        assert!(!args.iter().any(|a| a.contains("addon.far")));
    }

    #[test]
    fn cloud_extras_are_exactly_the_feature_pack() {
        let download = addon_download(Distribution::Cloud, Path::new(BUILD));
        assert_eq!(
            download.classifier.as_deref(),
            Some("cq-commerce-addon-authorfar")
        );

        let extras = distribution_extras(Distribution::Cloud, &download.output_path(), "2.17.0");
        assert_eq!(
            extras,
            vec![Installable::File(PathBuf::from(
                "/home/circleci/build/dependencies/addon.far"
            ))]
        );
        let args: Vec<String> = extras.iter().flat_map(|i| i.to_args()).collect();
        assert!(!args.iter().any(|a| a.contains("addon-650.zip")));
        assert!(!args.iter().any(|a| a.contains("core.wcm.components.all")));
    }

    #[test]
    fn snapshot_examples_bundle_uses_the_local_build() {
        let installable = examples_bundle(Path::new(BUILD), "2.6.0-SNAPSHOT");
        assert_eq!(
            installable,
            Installable::File(PathBuf::from(
                "/home/circleci/build/dependencies/aem-core-cif-components/examples/bundle/target/core-cif-components-examples-bundle-2.6.0-SNAPSHOT.jar"
            ))
        );
    }

    #[test]
    fn released_examples_bundle_uses_the_remote_coordinate() {
        let installable = examples_bundle(Path::new(BUILD), "2.5.0");
        assert_eq!(
            installable.to_args(),
            [
                "--bundle".to_string(),
                "com.adobe.commerce.cif:core-cif-components-examples-bundle:2.5.0:jar".to_string()
            ]
        );
    }

    #[test]
    fn bind_cmd_targets_the_management_server() {
        let qp = Quickstart::new("/home/circleci/cq");
        let cmd = qp.bind_cmd();
        assert_eq!(cmd.program, "./qp.sh");
        assert_eq!(
            cmd.args,
            vec!["-v", "bind", "--server-hostname", "localhost", "--server-port", "55555"]
        );
        assert_eq!(
            cmd.current_dir.as_deref(),
            Some(Path::new("/home/circleci/cq"))
        );
    }

    #[test]
    fn start_cmd_renders_installs_in_order_and_vm_options_as_one_argument() {
        let qp = Quickstart::new("/home/circleci/cq");
        let spec = StartSpec {
            runmode: "author".into(),
            port: AUTHOR_PORT,
            qs_jar: qp.quickstart_jar(),
            installs: vec![
                sling_junit_bundle(),
                Installable::File(PathBuf::from("/build/all/target/venia.all-1.0.0-classic.zip")),
            ],
            vm_options: vm_options(Path::new("/opt/jacoco/agent.jar")),
        };
        let cmd = qp.start_cmd(&spec);

        let args = cmd.args.join(" ");
        assert!(args.starts_with("-v start --id author --runmode author --port 4502"));
        assert!(args.contains("--qs-jar /home/circleci/cq/author/cq-quickstart.jar"));
        assert!(args.contains("--bundle org.apache.sling:org.apache.sling.junit.core:1.0.23:jar"));
        assert!(args.contains("--install-file /build/all/target/venia.all-1.0.0-classic.zip"));

        // The vm options are the final, single argument.
        assert_eq!(cmd.args[cmd.args.len() - 2], "--vm-options");
        assert_eq!(
            cmd.args.last().unwrap(),
            "-Xmx1536m -XX:MaxPermSize=256m -Djava.awt.headless=true \
             -javaagent:/opt/jacoco/agent.jar=destfile=crx-quickstart/jacoco-it.exec"
        );
    }

    #[test]
    fn stop_cmd_names_the_instance() {
        let cmd = Quickstart::new("/cq").stop_cmd();
        assert_eq!(cmd.args, vec!["-v", "stop", "--id", "author"]);
    }
}
