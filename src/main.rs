//! Binary entry point for the `cinder-pv` provisioner.
//!
//! Prints a single JSON line on stdout, `{"changed":true}` on success or
//! `{"failed":true,"msg":"..."}` with exit status 1 on failure. Logs go to
//! stderr and honour `RUST_LOG`.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cinder_pv::{
    CliRegistrar, CloudError, ConfigError, DeviceResolver, DiskByIdNamespace, IdentityError,
    OpenStackClient, ProcessCommandRunner, ProvisionConfig, ProvisionError, ProvisionOutcome,
    Provisioner, VolumePreparer, discover_server_id,
};

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("server discovery failed: {0}")]
    Identity(#[from] IdentityError),
    #[error("authentication failed: {0}")]
    Auth(#[source] CloudError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
enum Report {
    Changed { changed: bool },
    Failed { failed: bool, msg: String },
}

impl Report {
    const fn changed() -> Self {
        Self::Changed { changed: true }
    }

    fn failed(err: &CliError) -> Self {
        Self::Failed {
            failed: true,
            msg: err.to_string(),
        }
    }

    const fn exit_code(&self) -> i32 {
        match self {
            Self::Changed { .. } => 0,
            Self::Failed { .. } => 1,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let report = match run(cli).await {
        Ok(outcome) => {
            tracing::info!(
                volume_id = %outcome.volume.id,
                device = %outcome.device.local_path,
                manifests = outcome.manifests_submitted,
                "volume provisioned"
            );
            Report::changed()
        }
        Err(err) => {
            tracing::error!(error = %err, "provisioning aborted");
            Report::failed(&err)
        }
    };

    write_report(io::stdout(), &report);
    process::exit(report.exit_code());
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ProvisionOutcome, CliError> {
    let config = apply_overrides(ProvisionConfig::load_without_cli_args()?, cli);
    config.validate()?;

    let server_id = resolve_server(&config).await?;
    let request = config.as_request(&server_id)?;
    let client = OpenStackClient::authenticate(
        &config.credentials(),
        config.endpoint_type()?,
        config.endpoint_url.as_deref(),
    )
    .await
    .map_err(CliError::Auth)?;

    let provisioner = Provisioner::new(
        request,
        client,
        DeviceResolver::new(DiskByIdNamespace::new(config.device_dir.as_str())),
        VolumePreparer::new(ProcessCommandRunner),
        CliRegistrar::new(ProcessCommandRunner, config.cluster_cli.as_str()),
    )
    .with_cancellation(cancel_on_interrupt());

    Ok(provisioner.execute().await?)
}

async fn resolve_server(config: &ProvisionConfig) -> Result<String, CliError> {
    if let Some(server) = config
        .server
        .as_deref()
        .map(str::trim)
        .filter(|server| !server.is_empty())
    {
        return Ok(server.to_owned());
    }
    Ok(discover_server_id(&config.metadata_url).await?)
}

fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping at the next wait");
            trigger.cancel();
        }
    });
    token
}

fn apply_overrides(mut config: ProvisionConfig, cli: Cli) -> ProvisionConfig {
    let Cli {
        server,
        volume_name,
        volume_size,
        volume_type,
        availability_zone,
        filesystem,
        timeout,
        access_modes,
        cluster_cli,
    } = cli;

    if server.is_some() {
        config.server = server;
    }
    if volume_type.is_some() {
        config.volume_type = volume_type;
    }
    if availability_zone.is_some() {
        config.availability_zone = availability_zone;
    }
    if let Some(name) = volume_name {
        config.volume_name = name;
    }
    if let Some(size) = volume_size {
        config.volume_size = size;
    }
    if let Some(fs) = filesystem {
        config.filesystem = fs;
    }
    if let Some(secs) = timeout {
        config.timeout = secs;
    }
    if let Some(modes) = access_modes {
        config.access_modes = modes;
    }
    if let Some(program) = cluster_cli {
        config.cluster_cli = program;
    }
    config
}

fn write_report(mut target: impl Write, report: &Report) {
    if let Ok(line) = serde_json::to_string(report) {
        writeln!(target, "{line}").ok();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use cinder_pv::ProvisionStage;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> ProvisionConfig {
        ProvisionConfig {
            auth_url: String::from("http://keystone.test:5000/v2.0"),
            username: String::from("admin"),
            password: String::from("secret"),
            tenant: String::from("demo"),
            endpoint_type: String::from("publicURL"),
            endpoint_url: None,
            api_version: String::from("2"),
            server: None,
            volume_name: String::from("cinder-volume"),
            volume_size: 5,
            volume_type: None,
            availability_zone: None,
            filesystem: String::from("ext4"),
            timeout: 30,
            poll_interval: 1,
            access_modes: String::from("ReadWriteOnce"),
            device_dir: String::from("/dev/disk/by-id"),
            cluster_cli: String::from("oc"),
            metadata_url: String::from("http://127.0.0.1:9/meta_data.json"),
        }
    }

    fn render(report: &Report) -> String {
        let mut buffer = Vec::new();
        write_report(&mut buffer, report);
        String::from_utf8(buffer).unwrap_or_else(|err| panic!("utf8: {err}"))
    }

    #[test]
    fn success_report_is_a_single_changed_line() {
        assert_eq!(render(&Report::changed()), "{\"changed\":true}\n");
        assert_eq!(Report::changed().exit_code(), 0);
    }

    #[test]
    fn failure_report_names_the_stage() {
        let err = CliError::Provision(ProvisionError::Timeout {
            stage: ProvisionStage::Create,
            elapsed: Duration::from_secs(30),
        });
        let report = Report::failed(&err);

        assert_eq!(
            render(&report),
            "{\"failed\":true,\"msg\":\"create timeout after 30s\"}\n"
        );
        assert_eq!(report.exit_code(), 1);
    }

    #[rstest]
    fn overrides_replace_configured_values(config: ProvisionConfig) {
        let cli = Cli {
            server: Some(String::from("server-9")),
            volume_size: Some(20),
            filesystem: Some(String::from("xfs")),
            access_modes: Some(String::from("ReadWriteMany")),
            ..Cli::default()
        };

        let merged = apply_overrides(config.clone(), cli);

        assert_eq!(merged.server.as_deref(), Some("server-9"));
        assert_eq!(merged.volume_size, 20);
        assert_eq!(merged.filesystem, "xfs");
        assert_eq!(merged.access_modes, "ReadWriteMany");
        assert_eq!(merged.volume_name, config.volume_name);
        assert_eq!(merged.timeout, config.timeout);
    }

    #[rstest]
    fn absent_overrides_keep_configuration(config: ProvisionConfig) {
        assert_eq!(apply_overrides(config.clone(), Cli::default()), config);
    }

    #[rstest]
    #[tokio::test]
    async fn configured_server_skips_metadata_lookup(config: ProvisionConfig) {
        let configured = ProvisionConfig {
            server: Some(String::from("  server-1 ")),
            ..config
        };
        let server = resolve_server(&configured)
            .await
            .unwrap_or_else(|err| panic!("server: {err}"));
        assert_eq!(server, "server-1");
    }

    #[rstest]
    #[tokio::test]
    async fn metadata_failure_is_reported_as_discovery_error(config: ProvisionConfig) {
        let err = resolve_server(&config)
            .await
            .err()
            .unwrap_or_else(|| panic!("lookup should fail"));
        assert!(matches!(err, CliError::Identity(IdentityError::Request { .. })));
        assert!(err.to_string().starts_with("server discovery failed"));
    }
}
