//! Test doubles shared across unit and integration tests.
//!
//! Every double keeps its state behind an `Arc<Mutex<_>>` so clones observe
//! the same script and the doubles can be used from `Send` futures.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::cloud::{
    Attachment, CloudError, CloudFuture, Volume, VolumeClient, VolumeSpec, VolumeStatus,
};
use crate::command::{CommandOutput, CommandRunner, ShellError};
use crate::device::DeviceNamespace;
use crate::registrar::{Manifest, ManifestKind, RegistrationError, ResourceRegistrar};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Runs with an empty queue fail with [`ShellError::Spawn`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Queues an explicit command output.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    /// Queues a successful exit.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Queues `count` successful exits.
    pub fn push_successes(&self, count: usize) {
        for _ in 0..count {
            self.push_success();
        }
    }

    /// Queues a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ShellError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| ShellError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// In-memory device namespace whose entries can change during a test.
#[derive(Clone, Debug)]
pub struct SnapshotNamespace {
    root: Utf8PathBuf,
    entries: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl SnapshotNamespace {
    /// Creates a namespace rooted at `root` holding `names`.
    #[must_use]
    pub fn new<I, S>(root: impl Into<Utf8PathBuf>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            entries: Arc::new(Mutex::new(names.into_iter().map(Into::into).collect())),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    /// Creates an empty namespace under `/dev/disk/by-id`.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(crate::device::DEFAULT_DEVICE_DIR, Vec::<String>::new())
    }

    /// Makes a new entry visible.
    pub fn add_entry(&self, name: impl Into<String>) {
        lock(&self.entries).push(name.into());
    }

    /// Makes every subsequent listing fail with a permission error.
    pub fn fail_listing(&self) {
        *lock(&self.failing) = true;
    }
}

impl DeviceNamespace for SnapshotNamespace {
    fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn entries(&self) -> io::Result<Vec<String>> {
        if *lock(&self.failing) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "simulated listing failure",
            ));
        }
        Ok(lock(&self.entries).clone())
    }
}

/// Number of calls made against a [`ScriptedCloud`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CloudCalls {
    /// `create_volume` calls.
    pub create: u32,
    /// `get_volume` calls.
    pub get_volume: u32,
    /// `attach_volume` calls.
    pub attach: u32,
    /// `detach_volume` calls.
    pub detach: u32,
    /// `get_attachment` calls.
    pub get_attachment: u32,
}

#[derive(Debug)]
enum AttachmentRelease {
    AfterProbes(u32),
    Never,
}

#[derive(Debug)]
struct CloudScript {
    volume_id: String,
    statuses: VecDeque<VolumeStatus>,
    in_use_after_attach: bool,
    release: AttachmentRelease,
    device_on_attach: Option<(SnapshotNamespace, String)>,
    reported_details: Option<(String, u32)>,
    create_error: Option<CloudError>,
    attach_error: Option<CloudError>,
    detach_error: Option<CloudError>,
    probe_error: Option<CloudError>,
    created: Option<Volume>,
    attached: bool,
    detached: bool,
    calls: CloudCalls,
}

/// Fake volume provider driven by a script of reported states.
///
/// By default a created volume reports `available` straight away, reports
/// `in-use` once attached, and its attachment disappears on the first probe
/// after detaching.
#[derive(Clone, Debug)]
pub struct ScriptedCloud {
    script: Arc<Mutex<CloudScript>>,
}

/// Attachment identifier returned by [`ScriptedCloud`].
pub const SCRIPTED_ATTACHMENT_ID: &str = "attachment-1";

impl ScriptedCloud {
    /// Creates a provider that assigns `volume_id` to the created volume.
    #[must_use]
    pub fn new(volume_id: impl Into<String>) -> Self {
        Self {
            script: Arc::new(Mutex::new(CloudScript {
                volume_id: volume_id.into(),
                statuses: VecDeque::from([VolumeStatus::Available]),
                in_use_after_attach: true,
                release: AttachmentRelease::AfterProbes(0),
                device_on_attach: None,
                reported_details: None,
                create_error: None,
                attach_error: None,
                detach_error: None,
                probe_error: None,
                created: None,
                attached: false,
                detached: false,
                calls: CloudCalls::default(),
            })),
        }
    }

    /// Statuses reported by successive `get_volume` calls before attach. The
    /// last status repeats forever.
    pub fn report_statuses(&self, statuses: impl IntoIterator<Item = VolumeStatus>) {
        let queued: VecDeque<VolumeStatus> = statuses.into_iter().collect();
        if !queued.is_empty() {
            lock(&self.script).statuses = queued;
        }
    }

    /// Keeps reporting `available` after attach instead of `in-use`.
    pub fn never_in_use(&self) {
        lock(&self.script).in_use_after_attach = false;
    }

    /// Keeps the attachment visible for `probes` probes after detaching.
    pub fn attachment_lingers(&self, probes: u32) {
        lock(&self.script).release = AttachmentRelease::AfterProbes(probes);
    }

    /// Keeps the attachment visible forever after detaching.
    pub fn attachment_never_clears(&self) {
        lock(&self.script).release = AttachmentRelease::Never;
    }

    /// Adds `entry` to `namespace` when the volume is attached.
    pub fn attach_creates_device(&self, namespace: &SnapshotNamespace, entry: impl Into<String>) {
        lock(&self.script).device_on_attach = Some((namespace.clone(), entry.into()));
    }

    /// Reports `display_name` and `size_gib` from `get_volume` instead of
    /// the values requested at creation.
    pub fn report_volume_details(&self, display_name: impl Into<String>, size_gib: u32) {
        lock(&self.script).reported_details = Some((display_name.into(), size_gib));
    }

    /// Makes `create_volume` fail.
    pub fn fail_create(&self, error: CloudError) {
        lock(&self.script).create_error = Some(error);
    }

    /// Makes `attach_volume` fail.
    pub fn fail_attach(&self, error: CloudError) {
        lock(&self.script).attach_error = Some(error);
    }

    /// Makes `detach_volume` fail.
    pub fn fail_detach(&self, error: CloudError) {
        lock(&self.script).detach_error = Some(error);
    }

    /// Makes `get_attachment` fail with `error` after detaching.
    pub fn fail_attachment_probe(&self, error: CloudError) {
        lock(&self.script).probe_error = Some(error);
    }

    /// Returns the calls made so far.
    #[must_use]
    pub fn calls(&self) -> CloudCalls {
        lock(&self.script).calls
    }

    fn create(&self, spec: &VolumeSpec) -> Result<Volume, CloudError> {
        let mut script = lock(&self.script);
        script.calls.create += 1;
        if let Some(err) = script.create_error.clone() {
            return Err(err);
        }
        let volume = Volume {
            id: script.volume_id.clone(),
            display_name: spec.display_name.clone(),
            size_gib: spec.size_gib,
            volume_type: spec.volume_type.clone(),
            availability_zone: spec.availability_zone.clone(),
            status: VolumeStatus::Creating,
        };
        script.created = Some(volume.clone());
        Ok(volume)
    }

    fn volume(&self, volume_id: &str) -> Result<Volume, CloudError> {
        let mut script = lock(&self.script);
        script.calls.get_volume += 1;
        let Some(mut volume) = script.created.clone().filter(|vol| vol.id == volume_id) else {
            return Err(CloudError::NotFound {
                resource: String::from("volume"),
                id: volume_id.to_owned(),
            });
        };

        if let Some((display_name, size_gib)) = script.reported_details.clone() {
            volume.display_name = display_name;
            volume.size_gib = size_gib;
        }
        volume.status = if script.attached && !script.detached {
            if script.in_use_after_attach {
                VolumeStatus::InUse
            } else {
                VolumeStatus::Available
            }
        } else if script.statuses.len() > 1 {
            script
                .statuses
                .pop_front()
                .unwrap_or(VolumeStatus::Available)
        } else {
            script
                .statuses
                .front()
                .cloned()
                .unwrap_or(VolumeStatus::Available)
        };
        Ok(volume)
    }

    fn attach(&self, server_id: &str, volume_id: &str) -> Result<Attachment, CloudError> {
        let device = {
            let mut script = lock(&self.script);
            script.calls.attach += 1;
            if let Some(err) = script.attach_error.clone() {
                return Err(err);
            }
            script.attached = true;
            script.device_on_attach.clone()
        };
        if let Some((namespace, entry)) = device {
            namespace.add_entry(entry);
        }
        Ok(scripted_attachment(server_id, volume_id))
    }

    fn detach(&self) -> Result<(), CloudError> {
        let mut script = lock(&self.script);
        script.calls.detach += 1;
        if let Some(err) = script.detach_error.clone() {
            return Err(err);
        }
        script.detached = true;
        Ok(())
    }

    fn attachment(&self, server_id: &str, attachment_id: &str) -> Result<Attachment, CloudError> {
        let mut script = lock(&self.script);
        script.calls.get_attachment += 1;
        let not_found = CloudError::NotFound {
            resource: String::from("attachment"),
            id: attachment_id.to_owned(),
        };
        if !script.attached {
            return Err(not_found);
        }
        let volume_id = script.volume_id.clone();
        if !script.detached {
            return Ok(scripted_attachment(server_id, &volume_id));
        }
        if let Some(err) = script.probe_error.clone() {
            return Err(err);
        }
        match &mut script.release {
            AttachmentRelease::Never => Ok(scripted_attachment(server_id, &volume_id)),
            AttachmentRelease::AfterProbes(0) => Err(not_found),
            AttachmentRelease::AfterProbes(remaining) => {
                *remaining -= 1;
                Ok(scripted_attachment(server_id, &volume_id))
            }
        }
    }
}

fn scripted_attachment(server_id: &str, volume_id: &str) -> Attachment {
    Attachment {
        id: String::from(SCRIPTED_ATTACHMENT_ID),
        volume_id: volume_id.to_owned(),
        server_id: server_id.to_owned(),
        device_hint: Some(String::from("/dev/vdb")),
    }
}

impl VolumeClient for ScriptedCloud {
    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> CloudFuture<'a, Volume> {
        Box::pin(async move { self.create(spec) })
    }

    fn get_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, Volume> {
        Box::pin(async move { self.volume(volume_id) })
    }

    fn attach_volume<'a>(
        &'a self,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> CloudFuture<'a, Attachment> {
        Box::pin(async move { self.attach(server_id, volume_id) })
    }

    fn detach_volume<'a>(
        &'a self,
        _server_id: &'a str,
        _attachment_id: &'a str,
    ) -> CloudFuture<'a, ()> {
        Box::pin(async move { self.detach() })
    }

    fn get_attachment<'a>(
        &'a self,
        server_id: &'a str,
        attachment_id: &'a str,
    ) -> CloudFuture<'a, Attachment> {
        Box::pin(async move { self.attachment(server_id, attachment_id) })
    }
}

/// Registrar that records submitted manifests instead of running a CLI.
#[derive(Clone, Debug, Default)]
pub struct RecordingRegistrar {
    submitted: Arc<Mutex<Vec<Manifest>>>,
    failing: Arc<Mutex<Vec<ManifestKind>>>,
}

impl RecordingRegistrar {
    /// Creates a registrar accepting every manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects manifests of `kind`.
    pub fn fail_kind(&self, kind: ManifestKind) {
        lock(&self.failing).push(kind);
    }

    /// Manifests submitted so far, including rejected ones.
    #[must_use]
    pub fn submitted(&self) -> Vec<Manifest> {
        lock(&self.submitted).clone()
    }
}

impl ResourceRegistrar for RecordingRegistrar {
    fn submit(&self, manifest: &Manifest) -> Result<(), RegistrationError> {
        lock(&self.submitted).push(manifest.clone());
        if lock(&self.failing).contains(&manifest.kind) {
            return Err(RegistrationError::Command(ShellError::CommandFailure {
                program: String::from("oc"),
                status: Some(1),
                status_text: String::from("1"),
                stderr: String::from("simulated rejection"),
            }));
        }
        Ok(())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Sets `pairs` and removes `unset` while holding a global mutex.
    pub async fn apply(pairs: &[(&str, &str)], unset: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(unset.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + unset.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
        }
        for key in unset {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
