//! Discovery of the local block device backing an attached volume.
//!
//! Hypervisors expose attached disks under `/dev/disk/by-id` with names that
//! embed a truncated volume identifier (for example
//! `virtio-3f2a9c1e-77b0-4c1d-9`). The resolver matches the first eight
//! characters of the volume id as a substring. Two volumes sharing that prefix
//! on the same host cannot be told apart.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Directory scanned when no override is configured.
pub const DEFAULT_DEVICE_DIR: &str = "/dev/disk/by-id";

/// Number of leading volume id characters matched against device names.
pub const VOLUME_ID_PREFIX_LEN: usize = 8;

/// Local device path corresponding to an attached volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceBinding {
    /// Volume the device belongs to.
    pub volume_id: String,
    /// Absolute path of the device entry.
    pub local_path: Utf8PathBuf,
}

/// Source of locally visible block-device identifier entries.
pub trait DeviceNamespace {
    /// Directory the entries live in.
    fn root(&self) -> &Utf8Path;

    /// Lists entry names currently visible.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the listing fails.
    fn entries(&self) -> io::Result<Vec<String>>;
}

/// Device namespace backed by a directory such as `/dev/disk/by-id`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiskByIdNamespace {
    root: Utf8PathBuf,
}

impl DiskByIdNamespace {
    /// Scans `root` for device entries.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for DiskByIdNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_DIR)
    }
}

impl DeviceNamespace for DiskByIdNamespace {
    fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn entries(&self) -> io::Result<Vec<String>> {
        // The directory only appears once udev has seen a disk with an id.
        let dir = match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut names = Vec::new();
        for entry in dir.entries()? {
            names.push(entry?.file_name()?);
        }
        Ok(names)
    }
}

/// Maps a volume identifier to its local device path.
#[derive(Clone, Debug)]
pub struct DeviceResolver<N> {
    namespace: N,
}

impl<N: DeviceNamespace> DeviceResolver<N> {
    /// Creates a resolver over `namespace`.
    #[must_use]
    pub const fn new(namespace: N) -> Self {
        Self { namespace }
    }

    /// Returns the underlying namespace.
    #[must_use]
    pub const fn namespace(&self) -> &N {
        &self.namespace
    }

    /// Scans the namespace once and returns the first entry, in name order,
    /// containing the volume id prefix.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while listing the namespace.
    pub fn resolve(&self, volume_id: &str) -> io::Result<Option<DeviceBinding>> {
        let prefix = volume_id_prefix(volume_id);
        if prefix.is_empty() {
            return Ok(None);
        }

        let mut names = self.namespace.entries()?;
        names.sort_unstable();
        Ok(names
            .into_iter()
            .find(|name| name.contains(prefix.as_str()))
            .map(|name| DeviceBinding {
                volume_id: volume_id.to_owned(),
                local_path: self.namespace.root().join(name),
            }))
    }
}

/// Returns the leading characters of `volume_id` used for device matching.
#[must_use]
pub fn volume_id_prefix(volume_id: &str) -> String {
    volume_id.trim().chars().take(VOLUME_ID_PREFIX_LEN).collect()
}
