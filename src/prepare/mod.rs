//! Formatting and permission preparation of a freshly attached volume.
//!
//! The device is formatted, mounted on a scratch directory, opened up with
//! `chmod -R 777` so any pod user can write to it, then unmounted. A failing
//! step stops the sequence without unmounting or removing the scratch
//! directory.

mod error;

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use uuid::Uuid;

use crate::command::CommandRunner;

pub use error::{PrepareError, PrepareStep};

const SCRATCH_DIR_PREFIX: &str = "cinder-pv-";
const WORLD_WRITABLE_MODE: &str = "777";

/// Runs the format, mount, chmod and unmount sequence through a
/// [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct VolumePreparer<R> {
    runner: R,
    scratch_root: Option<Utf8PathBuf>,
}

impl<R: CommandRunner> VolumePreparer<R> {
    /// Creates a preparer whose scratch directories live in the system
    /// temporary directory.
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self {
            runner,
            scratch_root: None,
        }
    }

    /// Places scratch mount directories under `root` instead.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Returns the underlying command runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Formats `device` with `filesystem` and leaves it world-writable.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError::ScratchDir`] when the mount point cannot be
    /// managed, or [`PrepareError::Command`] naming the first failing step.
    pub fn prepare(&self, device: &Utf8Path, filesystem: &str) -> Result<(), PrepareError> {
        let scratch = ScratchDir::create(&self.scratch_root()?)?;
        tracing::debug!(mount_point = %scratch.path(), "created scratch mount point");

        for step in PrepareStep::SEQUENCE {
            let (program, args) = step_command(step, device, filesystem, scratch.path());
            tracing::info!(%step, %program, %device, "running preparation step");
            self.runner
                .run(&program, &args)
                .and_then(|output| output.into_result(&program))
                .map_err(|source| PrepareError::Command { step, source })?;
        }

        scratch.remove()
    }

    fn scratch_root(&self) -> Result<Utf8PathBuf, PrepareError> {
        if let Some(root) = &self.scratch_root {
            return Ok(root.clone());
        }
        Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| PrepareError::ScratchDir {
            path: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
            message: String::from("temporary directory path is not valid UTF-8"),
        })
    }
}

/// Builds the program and arguments for one preparation step.
#[must_use]
pub fn step_command(
    step: PrepareStep,
    device: &Utf8Path,
    filesystem: &str,
    mount_point: &Utf8Path,
) -> (String, Vec<OsString>) {
    match step {
        PrepareStep::Format => (
            format!("mkfs.{filesystem}"),
            vec![OsString::from(device.as_str())],
        ),
        PrepareStep::Mount => (
            String::from("mount"),
            vec![
                OsString::from(device.as_str()),
                OsString::from(mount_point.as_str()),
            ],
        ),
        PrepareStep::Permissions => (
            String::from("chmod"),
            vec![
                OsString::from("-R"),
                OsString::from(WORLD_WRITABLE_MODE),
                OsString::from(mount_point.as_str()),
            ],
        ),
        PrepareStep::Unmount => (
            String::from("umount"),
            vec![OsString::from(mount_point.as_str())],
        ),
    }
}

struct ScratchDir {
    parent: Dir,
    name: String,
    path: Utf8PathBuf,
}

impl ScratchDir {
    fn create(root: &Utf8Path) -> Result<Self, PrepareError> {
        let name = format!("{SCRATCH_DIR_PREFIX}{}", Uuid::new_v4().simple());
        let path = root.join(&name);
        let io_error = |err: std::io::Error| PrepareError::ScratchDir {
            path: path.clone(),
            message: err.to_string(),
        };

        let parent = Dir::open_ambient_dir(root, ambient_authority()).map_err(io_error)?;
        parent.create_dir(&name).map_err(io_error)?;
        Ok(Self { parent, name, path })
    }

    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn remove(self) -> Result<(), PrepareError> {
        self.parent
            .remove_dir(&self.name)
            .map_err(|err| PrepareError::ScratchDir {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }
}
