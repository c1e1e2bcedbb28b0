//! Shared fixtures for provisioning BDD scenarios.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use camino::Utf8PathBuf;
use cinder_pv::test_support::{
    RecordingRegistrar, ScriptedCloud, ScriptedRunner, SnapshotNamespace,
};
use cinder_pv::{
    AccessMode, DeviceResolver, Poller, ProvisionError, ProvisionOutcome, ProvisionRequest,
    Provisioner, VolumePreparer, VolumeSpec,
};
use rstest::fixture;
use tempfile::TempDir;

pub const VOLUME_ID: &str = "5b1c0d7e-2f41-4a8e-b3c9-6d0e4f2a1b77";
pub const DEVICE_ENTRY: &str = "virtio-5b1c0d7e-2f41-4a8e-b";

pub type ProvisionResult = Result<ProvisionOutcome, ProvisionError>;

pub type ScenarioProvisioner =
    Provisioner<ScriptedCloud, SnapshotNamespace, ScriptedRunner, RecordingRegistrar>;

pub struct ProvisionContext {
    pub cloud: ScriptedCloud,
    pub namespace: SnapshotNamespace,
    pub runner: ScriptedRunner,
    pub registrar: RecordingRegistrar,
    pub scratch: TempDir,
    pub timeout_secs: Cell<u64>,
    pub device_appears: Cell<bool>,
    pub outcome: RefCell<Option<ProvisionResult>>,
}

impl ProvisionContext {
    pub fn provisioner(&self) -> ScenarioProvisioner {
        let scratch_root = Utf8PathBuf::from_path_buf(self.scratch.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-utf8 tempdir: {}", path.display()));
        let request = ProvisionRequest {
            server_id: String::from("server-bdd"),
            volume: VolumeSpec::new("pgdata", 5),
            filesystem: String::from("ext4"),
            access_modes: vec![AccessMode::ReadWriteOnce],
            poller: Poller::new(
                Duration::from_secs(1),
                Duration::from_secs(self.timeout_secs.get()),
            ),
        };
        Provisioner::new(
            request,
            self.cloud.clone(),
            DeviceResolver::new(self.namespace.clone()),
            VolumePreparer::new(self.runner.clone()).with_scratch_root(scratch_root),
            self.registrar.clone(),
        )
    }
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    let runner = ScriptedRunner::new();
    runner.push_successes(4);
    ProvisionContext {
        cloud: ScriptedCloud::new(VOLUME_ID),
        namespace: SnapshotNamespace::new("/dev/disk/by-id", ["ata-QEMU_HARDDISK_QM00001"]),
        runner,
        registrar: RecordingRegistrar::new(),
        scratch: TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}")),
        timeout_secs: Cell::new(30),
        device_appears: Cell::new(true),
        outcome: RefCell::new(None),
    }
}
