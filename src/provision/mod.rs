//! Volume provisioning state machine.
//!
//! A run creates a volume, waits for it to become available, attaches it to
//! the local server, waits for the block device to appear, formats it, waits
//! for the provider to report the volume in use, detaches it, waits for the
//! attachment to disappear, and finally registers the volume with the
//! cluster. Every wait goes through the same [`Poller`]. A failure at any step
//! aborts the run; nothing already created is rolled back.

mod error;
mod state;

use tokio_util::sync::CancellationToken;

use crate::cloud::{Attachment, Volume, VolumeClient, VolumeSpec, VolumeStatus};
use crate::command::CommandRunner;
use crate::device::{DeviceBinding, DeviceNamespace, DeviceResolver};
use crate::poll::{PollError, Poller};
use crate::prepare::VolumePreparer;
use crate::registrar::{AccessMode, ResourceRegistrar, StorageResourceSpec, register_storage};

pub use error::ProvisionError;
pub use state::{ProvisionStage, ProvisionState};

use state::Journal;

/// Immutable description of a single provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Server the volume is attached to while being prepared.
    pub server_id: String,
    /// Volume to create.
    pub volume: VolumeSpec,
    /// Filesystem passed to `mkfs.<filesystem>`.
    pub filesystem: String,
    /// Access modes written into both manifests.
    pub access_modes: Vec<AccessMode>,
    /// Interval and timeout applied to every wait.
    pub poller: Poller,
}

/// Result of a successful run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionOutcome {
    /// Volume as last reported by the provider while waiting for it.
    pub volume: Volume,
    /// Attachment used while preparing the volume; no longer present.
    pub attachment: Attachment,
    /// Device the volume appeared as while attached.
    pub device: DeviceBinding,
    /// Number of manifests accepted by the cluster.
    pub manifests_submitted: usize,
    /// States visited, from `Requested` to `Registered`.
    pub history: Vec<ProvisionState>,
}

/// Drives a [`ProvisionRequest`] through the provisioning states.
#[derive(Debug)]
pub struct Provisioner<C, N, R, G> {
    request: ProvisionRequest,
    client: C,
    resolver: DeviceResolver<N>,
    preparer: VolumePreparer<R>,
    registrar: G,
    cancel: CancellationToken,
}

impl<C, N, R, G> Provisioner<C, N, R, G>
where
    C: VolumeClient,
    N: DeviceNamespace,
    R: CommandRunner + Clone + Send + 'static,
    G: ResourceRegistrar + Clone + Send + 'static,
{
    /// Creates a provisioner with its own cancellation token.
    #[must_use]
    pub fn new(
        request: ProvisionRequest,
        client: C,
        resolver: DeviceResolver<N>,
        preparer: VolumePreparer<R>,
        registrar: G,
    ) -> Self {
        Self {
            request,
            client,
            resolver,
            preparer,
            registrar,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token observed by every wait.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the run when cancelled, during a wait or while a
    /// preparation or registration command is running.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request driven by this provisioner.
    #[must_use]
    pub const fn request(&self) -> &ProvisionRequest {
        &self.request
    }

    /// Runs every step in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] raised; its
    /// [`reason`](ProvisionError::reason) is the `Failed` state reason.
    pub async fn execute(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let mut journal = Journal::start();
        match self.run(&mut journal).await {
            Ok(completed) => Ok(ProvisionOutcome {
                volume: completed.volume,
                attachment: completed.attachment,
                device: completed.device,
                manifests_submitted: completed.manifests_submitted,
                history: journal.into_history(),
            }),
            Err(err) => {
                journal.enter(err.state());
                Err(err)
            }
        }
    }

    async fn run(&self, journal: &mut Journal) -> Result<Completed, ProvisionError> {
        let volume = self.create(journal).await?;
        let (attachment, device) = self.attach(&volume, journal).await?;

        journal.enter(ProvisionState::Preparing);
        let preparer = self.preparer.clone();
        let device_path = device.local_path.clone();
        let filesystem = self.request.filesystem.clone();
        self.run_blocking(ProvisionStage::Prepare, move || {
            preparer
                .prepare(&device_path, &filesystem)
                .map_err(ProvisionError::Prepare)
        })
        .await?;
        journal.enter(ProvisionState::Prepared);

        self.detach(&volume, &attachment, journal).await?;

        let registrar = self.registrar.clone();
        let spec = self.storage_spec(&volume);
        let manifests_submitted = self
            .run_blocking(ProvisionStage::Register, move || {
                register_storage(&registrar, &spec).map_err(ProvisionError::Register)
            })
            .await?;
        journal.enter(ProvisionState::Registered);

        Ok(Completed {
            volume,
            attachment,
            device,
            manifests_submitted,
        })
    }

    async fn create(&self, journal: &mut Journal) -> Result<Volume, ProvisionError> {
        let created = self
            .client
            .create_volume(&self.request.volume)
            .await
            .map_err(ProvisionError::Create)?;
        journal.bind_volume(&created.id);
        journal.enter(ProvisionState::Creating);

        let client = &self.client;
        let volume_id = created.id.as_str();
        let volume = self
            .request
            .poller
            .wait_for(&self.cancel, move || volume_available(client, volume_id))
            .await
            .map_err(|err| ProvisionError::from_wait(ProvisionStage::Create, err))?;

        journal.enter(ProvisionState::Available);
        Ok(volume)
    }

    async fn attach(
        &self,
        volume: &Volume,
        journal: &mut Journal,
    ) -> Result<(Attachment, DeviceBinding), ProvisionError> {
        let attachment = self
            .client
            .attach_volume(&self.request.server_id, &volume.id)
            .await
            .map_err(ProvisionError::Attach)?;
        journal.enter(ProvisionState::Attaching);

        let resolver = &self.resolver;
        let volume_id = volume.id.as_str();
        let device = self
            .request
            .poller
            .wait_for(&self.cancel, move || {
                std::future::ready(resolver.resolve(volume_id).map_err(|err| {
                    ProvisionError::DeviceScan {
                        message: err.to_string(),
                    }
                }))
            })
            .await
            .map_err(|err| ProvisionError::from_wait(ProvisionStage::Attach, err))?;

        tracing::info!(
            volume_id,
            device = %device.local_path,
            attachment_id = %attachment.id,
            "volume device found"
        );
        journal.enter(ProvisionState::Attached);
        Ok((attachment, device))
    }

    async fn detach(
        &self,
        volume: &Volume,
        attachment: &Attachment,
        journal: &mut Journal,
    ) -> Result<(), ProvisionError> {
        journal.enter(ProvisionState::Detaching);
        let client = &self.client;
        let volume_id = volume.id.as_str();
        let server_id = self.request.server_id.as_str();
        let attachment_id = attachment.id.as_str();

        let in_use = self
            .request
            .poller
            .wait_until(&self.cancel, move || volume_in_use(client, volume_id))
            .await;
        match in_use {
            Ok(_) => {}
            Err(PollError::Timeout { elapsed }) => {
                tracing::warn!(
                    volume_id,
                    ?elapsed,
                    "volume never reported in-use, detaching anyway"
                );
            }
            Err(err) => return Err(ProvisionError::from_wait(ProvisionStage::Detach, err)),
        }

        client
            .detach_volume(server_id, attachment_id)
            .await
            .map_err(ProvisionError::Detach)?;

        self.request
            .poller
            .wait_until(&self.cancel, move || {
                attachment_released(client, server_id, attachment_id)
            })
            .await
            .map_err(|err| ProvisionError::from_wait(ProvisionStage::Detach, err))?;

        journal.enter(ProvisionState::Detached);
        Ok(())
    }

    /// Name and capacity come from the request; only the id is the
    /// provider's.
    fn storage_spec(&self, volume: &Volume) -> StorageResourceSpec {
        StorageResourceSpec {
            name: self.request.volume.display_name.clone(),
            volume_id: volume.id.clone(),
            size_gib: self.request.volume.size_gib,
            filesystem: self.request.filesystem.clone(),
            access_modes: self.request.access_modes.clone(),
        }
    }

    /// Runs synchronous shell-outs on the blocking pool so a cancelled run
    /// stops waiting for them. A cancelled command keeps running to
    /// completion in the background.
    async fn run_blocking<T, F>(
        &self,
        stage: ProvisionStage,
        work: F,
    ) -> Result<T, ProvisionError>
    where
        F: FnOnce() -> Result<T, ProvisionError> + Send + 'static,
        T: Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled { stage });
        }
        let task = tokio::task::spawn_blocking(work);
        tokio::select! {
            () = self.cancel.cancelled() => Err(ProvisionError::Cancelled { stage }),
            joined = task => joined.unwrap_or_else(|err| {
                Err(ProvisionError::Worker {
                    stage,
                    message: err.to_string(),
                })
            }),
        }
    }
}

async fn volume_available<C: VolumeClient>(
    client: &C,
    volume_id: &str,
) -> Result<Option<Volume>, ProvisionError> {
    let current = client
        .get_volume(volume_id)
        .await
        .map_err(|source| ProvisionError::Refresh {
            stage: ProvisionStage::Create,
            source,
        })?;
    match current.status {
        VolumeStatus::Available => Ok(Some(current)),
        VolumeStatus::Error => Err(ProvisionError::VolumeErrored {
            volume_id: volume_id.to_owned(),
        }),
        _ => {
            tracing::debug!(
                volume_id,
                status = %current.status,
                "waiting for volume to become available"
            );
            Ok(None)
        }
    }
}

async fn volume_in_use<C: VolumeClient>(
    client: &C,
    volume_id: &str,
) -> Result<bool, ProvisionError> {
    let current = client
        .get_volume(volume_id)
        .await
        .map_err(|source| ProvisionError::Refresh {
            stage: ProvisionStage::Detach,
            source,
        })?;
    Ok(current.status == VolumeStatus::InUse)
}

// The provider answers 404 once the attachment is gone.
async fn attachment_released<C: VolumeClient>(
    client: &C,
    server_id: &str,
    attachment_id: &str,
) -> Result<bool, ProvisionError> {
    match client.get_attachment(server_id, attachment_id).await {
        Ok(_) => Ok(false),
        Err(err) if err.is_not_found() => Ok(true),
        Err(source) => Err(ProvisionError::Refresh {
            stage: ProvisionStage::Detach,
            source,
        }),
    }
}

struct Completed {
    volume: Volume,
    attachment: Attachment,
    device: DeviceBinding,
    manifests_submitted: usize,
}
