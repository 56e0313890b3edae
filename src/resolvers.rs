/*
 * safeopen: traversal-safe file opening beneath a base directory
 * Copyright (C) 2019-2024 Aleksa Sarai <cyphar@cyphar.com>
 * Copyright (C) 2019-2024 SUSE LLC
 *
 * This program is free software: you can redistribute it and/or modify it
 * under the terms of the GNU Lesser General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or (at your
 * option) any later version.
 *
 * This program is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
 * or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License
 * for more details.
 *
 * You should have received a copy of the GNU Lesser General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */
#![forbid(unsafe_code)]

//! Resolver implementations for safeopen.

use crate::{error::Error, flags::OpenFlags, path::PathSegments};

use std::fs::File;

#[cfg(unix)]
use crate::{error::ErrorImpl, syscalls};
#[cfg(unix)]
use std::{os::unix::io::AsFd, path::Path};
#[cfg(windows)]
use std::os::windows::io::AsHandle;

/// Portable component-by-component walk using `openat(2)`.
#[cfg(unix)]
pub(crate) mod legacy;

/// `openat2(2)`-based in-kernel resolver.
#[cfg(target_os = "linux")]
pub(crate) mod openat2;

/// `NtCreateFile`-based walk for native Windows.
#[cfg(windows)]
pub(crate) mod windows;

/// The backend used to open a path beneath a base directory.
///
/// We don't generally recommend specifying this, since safeopen will
/// automatically pick the best backend for your platform (which is the value
/// returned by `ResolverBackend::default`). However, this can be useful for
/// testing, or to force the portable walk on kernels with a broken
/// `openat2(2)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ResolverBackend {
    /// Use the native `openat2(2)` backend. If the running kernel turns out
    /// not to support it, this transparently uses [`LegacyWalk`] instead.
    ///
    /// [`LegacyWalk`]: ResolverBackend::LegacyWalk
    #[cfg(target_os = "linux")]
    KernelOpenat2,
    /// Walk the path one component at a time with `O_NOFOLLOW` directory
    /// descriptors. Works on any unix.
    #[cfg(unix)]
    LegacyWalk,
    /// Walk the path one component at a time with `NtCreateFile`, rejecting
    /// reparse points.
    #[cfg(windows)]
    NtCreateFile,
}

impl Default for ResolverBackend {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        ResolverBackend::KernelOpenat2
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn default() -> Self {
        ResolverBackend::LegacyWalk
    }

    #[cfg(windows)]
    fn default() -> Self {
        ResolverBackend::NtCreateFile
    }
}

impl ResolverBackend {
    /// Checks if the resolver is natively supported on the current platform.
    ///
    /// For [`KernelOpenat2`] this probes the running kernel (once).
    /// An unsupported backend still works, it just falls back to the
    /// portable walk.
    ///
    /// [`KernelOpenat2`]: ResolverBackend::KernelOpenat2
    pub fn supported(self) -> bool {
        match self {
            #[cfg(target_os = "linux")]
            ResolverBackend::KernelOpenat2 => openat2::is_supported(),
            #[cfg(unix)]
            ResolverBackend::LegacyWalk => true,
            #[cfg(windows)]
            ResolverBackend::NtCreateFile => true,
        }
    }
}

/// Resolver backend configuration.
///
/// This is the primary structure used to configure how the open helpers
/// conduct path resolutions. The free functions at the crate root all use
/// `Resolver::default()`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Resolver {
    /// Underlying resolution backend used.
    pub backend: ResolverBackend,
}

impl Resolver {
    /// Construct a [`Resolver`] using a specific backend.
    pub fn new(backend: ResolverBackend) -> Self {
        Self { backend }
    }

    /// Open `segments` beneath the already-open base directory.
    pub(crate) fn open_segments(
        &self,
        base: &File,
        segments: &PathSegments,
        flags: OpenFlags,
        perm: u32,
    ) -> Result<File, Error> {
        match self.backend {
            #[cfg(target_os = "linux")]
            ResolverBackend::KernelOpenat2 => openat2::open(base.as_fd(), segments, flags, perm),
            #[cfg(unix)]
            ResolverBackend::LegacyWalk => legacy::open(base.as_fd(), segments, flags, perm),
            #[cfg(windows)]
            ResolverBackend::NtCreateFile => {
                // There is no permission model to map perm onto.
                let _ = perm;
                windows::open(base.as_handle(), segments, flags)
            }
        }
    }
}

/// Open the trusted base directory. The base path itself may contain
/// symlinks, only the relative part is resolved safely.
#[cfg(unix)]
pub(crate) fn open_base(base: &Path) -> Result<File, Error> {
    syscalls::openat_follow(libc::AT_FDCWD, base, libc::O_RDONLY | libc::O_DIRECTORY, 0).map_err(
        |err| {
            ErrorImpl::RawOsError {
                operation: "open base directory".into(),
                source: err,
            }
            .into()
        },
    )
}

#[cfg(windows)]
pub(crate) use windows::open_base;
