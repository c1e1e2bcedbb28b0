//! Registration of a prepared volume with the container orchestrator.
//!
//! A PersistentVolume and its matching PersistentVolumeClaim are rendered as
//! YAML and submitted with the cluster CLI (`oc create -f <file>` by
//! default). Both submissions are always attempted.

mod manifest;

use std::ffi::OsString;
use std::io::Write;

use thiserror::Error;

use crate::command::{CommandRunner, ShellError};

pub use manifest::{
    API_VERSION, AccessMode, CLAIM_PREFIX, CinderVolumeSource, Manifest, ManifestKind,
    ManifestSpec, ObjectMeta, PersistentVolumeClaimSpec, PersistentVolumeSpec,
    ResourceRequirements, StorageQuantity, StorageResourceSpec,
};

/// Default cluster command line tool.
pub const DEFAULT_CLUSTER_CLI: &str = "oc";

/// Errors raised while registering resources.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RegistrationError {
    /// Raised when a manifest cannot be rendered.
    #[error("failed to render {kind} manifest: {message}")]
    Serialise {
        /// Kind being rendered.
        kind: ManifestKind,
        /// Serialiser message.
        message: String,
    },
    /// Raised when the manifest file cannot be written.
    #[error("failed to write manifest file: {message}")]
    TempFile {
        /// I/O error message.
        message: String,
    },
    /// Raised when the cluster CLI rejects a manifest.
    #[error("cluster CLI failed: {0}")]
    Command(#[source] ShellError),
    /// Raised when at least one of the two resources was not created.
    #[error("registered {submitted} of {attempted} resources: {}", failures.join("; "))]
    Partial {
        /// Submissions that succeeded.
        submitted: usize,
        /// Submissions attempted.
        attempted: usize,
        /// One message per failed submission.
        failures: Vec<String>,
    },
}

/// Submits manifests to the cluster control plane.
pub trait ResourceRegistrar {
    /// Creates the resource described by `manifest`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when the resource could not be created.
    fn submit(&self, manifest: &Manifest) -> Result<(), RegistrationError>;
}

impl<G: ResourceRegistrar + ?Sized> ResourceRegistrar for &G {
    fn submit(&self, manifest: &Manifest) -> Result<(), RegistrationError> {
        (**self).submit(manifest)
    }
}

/// Registrar that writes each manifest to a temporary file and runs
/// `<cli> create -f <file>`.
#[derive(Clone, Debug)]
pub struct CliRegistrar<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> CliRegistrar<R> {
    /// Creates a registrar that invokes `program`.
    #[must_use]
    pub fn new(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Cluster CLI being invoked.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl<R: CommandRunner> ResourceRegistrar for CliRegistrar<R> {
    fn submit(&self, manifest: &Manifest) -> Result<(), RegistrationError> {
        let yaml = manifest
            .to_yaml()
            .map_err(|err| RegistrationError::Serialise {
                kind: manifest.kind,
                message: err.to_string(),
            })?;

        let temp_error = |err: std::io::Error| RegistrationError::TempFile {
            message: err.to_string(),
        };
        let mut file = tempfile::Builder::new()
            .prefix("cinder-pv-")
            .suffix(".yaml")
            .tempfile()
            .map_err(temp_error)?;
        file.write_all(yaml.as_bytes()).map_err(temp_error)?;
        file.flush().map_err(temp_error)?;

        let args = [
            OsString::from("create"),
            OsString::from("-f"),
            file.path().as_os_str().to_owned(),
        ];
        tracing::debug!(
            program = %self.program,
            kind = %manifest.kind,
            name = manifest.name(),
            "submitting manifest"
        );
        self.runner
            .run(&self.program, &args)
            .and_then(|output| output.into_result(&self.program))
            .map_err(RegistrationError::Command)?;
        Ok(())
    }
}

/// Submits the PersistentVolume then the PersistentVolumeClaim for `spec`.
///
/// A failed volume submission does not prevent the claim submission.
/// Returns the number of resources created.
///
/// # Errors
///
/// Returns [`RegistrationError::Partial`] listing every failed submission.
pub fn register_storage<G>(
    registrar: &G,
    spec: &StorageResourceSpec,
) -> Result<usize, RegistrationError>
where
    G: ResourceRegistrar + ?Sized,
{
    let manifests = spec.manifests();
    let mut submitted = 0;
    let mut failures = Vec::new();

    for manifest in &manifests {
        match registrar.submit(manifest) {
            Ok(()) => {
                submitted += 1;
                tracing::info!(
                    kind = %manifest.kind,
                    name = manifest.name(),
                    "registered resource"
                );
            }
            Err(err) => {
                tracing::warn!(
                    kind = %manifest.kind,
                    name = manifest.name(),
                    error = %err,
                    "resource registration failed"
                );
                failures.push(format!("{} {}: {err}", manifest.kind, manifest.name()));
            }
        }
    }

    if failures.is_empty() {
        Ok(submitted)
    } else {
        Err(RegistrationError::Partial {
            submitted,
            attempted: manifests.len(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingRegistrar, ScriptedRunner};
    use rstest::{fixture, rstest};

    #[fixture]
    fn spec() -> StorageResourceSpec {
        StorageResourceSpec {
            name: String::from("vol1"),
            volume_id: String::from("abc123"),
            size_gib: 5,
            filesystem: String::from("ext4"),
            access_modes: vec![AccessMode::ReadWriteOnce],
        }
    }

    #[rstest]
    fn cli_registrar_runs_create_with_a_yaml_file(spec: StorageResourceSpec) {
        let runner = ScriptedRunner::new();
        runner.push_success();
        let registrar = CliRegistrar::new(runner.clone(), "kubectl");

        registrar
            .submit(&spec.persistent_volume())
            .unwrap_or_else(|err| panic!("submit: {err}"));

        let calls = runner.invocations();
        let call = calls.first().unwrap_or_else(|| panic!("no invocation"));
        assert_eq!(call.program, "kubectl");
        let args: Vec<String> = call
            .args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.first().map(String::as_str), Some("create"));
        assert_eq!(args.get(1).map(String::as_str), Some("-f"));
        let file = call
            .args
            .get(2)
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_else(|| panic!("missing manifest path"));
        assert!(file.ends_with(".yaml"));
        assert!(
            !std::path::Path::new(&file).exists(),
            "manifest file should be removed after submission"
        );
    }

    #[rstest]
    fn cli_failure_is_a_command_error(spec: StorageResourceSpec) {
        let runner = ScriptedRunner::new();
        runner.push_failure(1);
        let registrar = CliRegistrar::new(runner, DEFAULT_CLUSTER_CLI);

        let err = registrar
            .submit(&spec.persistent_volume_claim())
            .err()
            .unwrap_or_else(|| panic!("failure expected"));
        assert!(matches!(
            err,
            RegistrationError::Command(ShellError::CommandFailure { status: Some(1), .. })
        ));
    }

    #[rstest]
    fn both_resources_are_submitted_in_order(spec: StorageResourceSpec) {
        let registrar = RecordingRegistrar::new();

        let submitted = register_storage(&registrar, &spec)
            .unwrap_or_else(|err| panic!("register: {err}"));

        assert_eq!(submitted, 2);
        let names: Vec<String> = registrar
            .submitted()
            .iter()
            .map(|manifest| manifest.name().to_owned())
            .collect();
        assert_eq!(names, vec![String::from("vol1"), String::from("claim-vol1")]);
    }

    #[rstest]
    fn claim_is_attempted_after_volume_failure(spec: StorageResourceSpec) {
        let registrar = RecordingRegistrar::new();
        registrar.fail_kind(ManifestKind::PersistentVolume);

        let err = register_storage(&registrar, &spec)
            .err()
            .unwrap_or_else(|| panic!("partial failure expected"));

        assert_eq!(registrar.submitted().len(), 2);
        match err {
            RegistrationError::Partial {
                submitted,
                attempted,
                failures,
            } => {
                assert_eq!((submitted, attempted), (1, 2));
                assert_eq!(failures.len(), 1);
                assert!(
                    failures
                        .first()
                        .is_some_and(|msg| msg.starts_with("PersistentVolume vol1"))
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
