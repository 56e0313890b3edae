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

//! The public open operations.
//!
//! Every operation exists twice: as a method on [`Resolver`] (so a specific
//! [`ResolverBackend`] can be used) and as a free function using
//! `Resolver::default()`.
//!
//! [`ResolverBackend`]: crate::ResolverBackend

use crate::{
    error::{Error, ErrorExt, ErrorImpl},
    flags::OpenFlags,
    path::{self, ResolutionMode},
    resolvers::{self, Resolver},
    utils::OsStrBytes,
    Handle,
};

use std::{
    io::{Read, Write},
    path::Path,
};

/// Permissions used by the `create_*` operations (before the umask).
pub const DEFAULT_CREATE_PERM: u32 = 0o666;

fn create_flags() -> OpenFlags {
    OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_TRUNC
}

fn write_flags() -> OpenFlags {
    OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC
}

impl Resolver {
    fn open_unwrapped(
        &self,
        base: &Path,
        path: &Path,
        mode: ResolutionMode,
        flags: OpenFlags,
        perm: u32,
    ) -> Result<Handle, Error> {
        // Nothing is opened until the relative path has been validated.
        let segments = path::validate(path, mode)?;
        if memchr::memchr(b'\0', base.as_os_str().as_os_bytes()).is_some() {
            Err(ErrorImpl::InvalidPath {
                path: base.into(),
                description: "base path contains a nul byte".into(),
            })?
        }

        let base_dir = resolvers::open_base(base)?;
        let file = self.open_segments(&base_dir, &segments, flags, perm)?;
        Ok(Handle::new(
            file,
            flags,
            base.join(segments.to_path_buf()),
        ))
    }

    fn open_op(
        &self,
        operation: &str,
        base: &Path,
        path: &Path,
        mode: ResolutionMode,
        flags: OpenFlags,
        perm: u32,
    ) -> Result<Handle, Error> {
        self.open_unwrapped(base, path, mode, flags, perm)
            .with_wrap(|| format!("{operation} {path:?} in {base:?}"))
    }

    /// Open `path` relative to `base` using an explicit [`ResolutionMode`].
    ///
    /// `perm` is only used when a file is created (and ignored on Windows).
    pub fn open_file<B: AsRef<Path>, P: AsRef<Path>>(
        &self,
        base: B,
        path: P,
        mode: ResolutionMode,
        flags: OpenFlags,
        perm: u32,
    ) -> Result<Handle, Error> {
        self.open_op("open_file", base.as_ref(), path.as_ref(), mode, flags, perm)
    }

    /// Open the direct child `name` of `base` read-only.
    pub fn open_direct_child<B: AsRef<Path>, N: AsRef<Path>>(
        &self,
        base: B,
        name: N,
    ) -> Result<Handle, Error> {
        self.open_op(
            "open_direct_child",
            base.as_ref(),
            name.as_ref(),
            ResolutionMode::DirectChild,
            OpenFlags::O_RDONLY,
            0,
        )
    }

    /// Create (or truncate) the direct child `name` of `base` and open it
    /// read-write.
    pub fn create_direct_child<B: AsRef<Path>, N: AsRef<Path>>(
        &self,
        base: B,
        name: N,
    ) -> Result<Handle, Error> {
        self.open_op(
            "create_direct_child",
            base.as_ref(),
            name.as_ref(),
            ResolutionMode::DirectChild,
            create_flags(),
            DEFAULT_CREATE_PERM,
        )
    }

    /// Open the direct child `name` of `base` with the given flags and
    /// creation permissions.
    pub fn open_file_direct_child<B: AsRef<Path>, N: AsRef<Path>>(
        &self,
        base: B,
        name: N,
        flags: OpenFlags,
        perm: u32,
    ) -> Result<Handle, Error> {
        self.open_op(
            "open_file_direct_child",
            base.as_ref(),
            name.as_ref(),
            ResolutionMode::DirectChild,
            flags,
            perm,
        )
    }

    /// Open `path` beneath `base` read-only.
    pub fn open_beneath<B: AsRef<Path>, P: AsRef<Path>>(
        &self,
        base: B,
        path: P,
    ) -> Result<Handle, Error> {
        self.open_op(
            "open_beneath",
            base.as_ref(),
            path.as_ref(),
            ResolutionMode::Beneath,
            OpenFlags::O_RDONLY,
            0,
        )
    }

    /// Create (or truncate) `path` beneath `base` and open it read-write. The
    /// parent directories must already exist.
    pub fn create_beneath<B: AsRef<Path>, P: AsRef<Path>>(
        &self,
        base: B,
        path: P,
    ) -> Result<Handle, Error> {
        self.open_op(
            "create_beneath",
            base.as_ref(),
            path.as_ref(),
            ResolutionMode::Beneath,
            create_flags(),
            DEFAULT_CREATE_PERM,
        )
    }

    /// Open `path` beneath `base` with the given flags and creation
    /// permissions.
    pub fn open_file_beneath<B: AsRef<Path>, P: AsRef<Path>>(
        &self,
        base: B,
        path: P,
        flags: OpenFlags,
        perm: u32,
    ) -> Result<Handle, Error> {
        self.open_op(
            "open_file_beneath",
            base.as_ref(),
            path.as_ref(),
            ResolutionMode::Beneath,
            flags,
            perm,
        )
    }

    /// Read the whole contents of the direct child `name` of `base`.
    pub fn read_direct_child<B: AsRef<Path>, N: AsRef<Path>>(
        &self,
        base: B,
        name: N,
    ) -> Result<Vec<u8>, Error> {
        let handle = self.open_op(
            "read_direct_child",
            base.as_ref(),
            name.as_ref(),
            ResolutionMode::DirectChild,
            OpenFlags::O_RDONLY,
            0,
        )?;
        read_all(handle)
    }

    /// Replace the contents of the direct child `name` of `base` with `data`,
    /// creating it with `perm` if needed.
    pub fn write_direct_child<B: AsRef<Path>, N: AsRef<Path>, D: AsRef<[u8]>>(
        &self,
        base: B,
        name: N,
        data: D,
        perm: u32,
    ) -> Result<(), Error> {
        let handle = self.open_op(
            "write_direct_child",
            base.as_ref(),
            name.as_ref(),
            ResolutionMode::DirectChild,
            write_flags(),
            perm,
        )?;
        write_all(handle, data.as_ref())
    }

    /// Read the whole contents of `path` beneath `base`.
    pub fn read_beneath<B: AsRef<Path>, P: AsRef<Path>>(
        &self,
        base: B,
        path: P,
    ) -> Result<Vec<u8>, Error> {
        let handle = self.open_op(
            "read_beneath",
            base.as_ref(),
            path.as_ref(),
            ResolutionMode::Beneath,
            OpenFlags::O_RDONLY,
            0,
        )?;
        read_all(handle)
    }

    /// Replace the contents of `path` beneath `base` with `data`, creating it
    /// with `perm` if needed.
    pub fn write_beneath<B: AsRef<Path>, P: AsRef<Path>, D: AsRef<[u8]>>(
        &self,
        base: B,
        path: P,
        data: D,
        perm: u32,
    ) -> Result<(), Error> {
        let handle = self.open_op(
            "write_beneath",
            base.as_ref(),
            path.as_ref(),
            ResolutionMode::Beneath,
            write_flags(),
            perm,
        )?;
        write_all(handle, data.as_ref())
    }
}

fn read_all(mut handle: Handle) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    handle.read_to_end(&mut buf).map_err(|err| ErrorImpl::OsError {
        operation: format!("read {:?}", handle.path()).into(),
        source: err,
    })?;
    Ok(buf)
}

fn write_all(mut handle: Handle, data: &[u8]) -> Result<(), Error> {
    handle
        .write_all(data)
        .and_then(|_| handle.flush())
        .map_err(|err| ErrorImpl::OsError {
            operation: format!("write {:?}", handle.path()).into(),
            source: err,
        })?;

    // Dropping the handle swallows close errors, so make delayed write errors
    // (quota, network filesystems) show up here instead. Devices and pipes
    // may not support syncing at all.
    if handle.metadata()?.is_file() {
        handle
            .as_file()
            .sync_all()
            .map_err(|err| ErrorImpl::OsError {
                operation: format!("sync {:?}", handle.path()).into(),
                source: err,
            })?;
    }
    Ok(())
}

/// Open the direct child `name` of `base` read-only.
///
/// `name` must be a single path component: any separator, `.` or `..` is
/// rejected with [`ErrorKind::InvalidPath`], and a symlink at `name` with
/// [`ErrorKind::SymlinkRejected`].
///
/// [`ErrorKind::InvalidPath`]: crate::error::ErrorKind::InvalidPath
/// [`ErrorKind::SymlinkRejected`]: crate::error::ErrorKind::SymlinkRejected
pub fn open_direct_child<B: AsRef<Path>, N: AsRef<Path>>(base: B, name: N) -> Result<Handle, Error> {
    Resolver::default().open_direct_child(base, name)
}

/// Create (or truncate) the direct child `name` of `base`, opened read-write
/// with permissions `0o666` before the umask.
pub fn create_direct_child<B: AsRef<Path>, N: AsRef<Path>>(
    base: B,
    name: N,
) -> Result<Handle, Error> {
    Resolver::default().create_direct_child(base, name)
}

/// Open the direct child `name` of `base` with arbitrary flags.
pub fn open_file_direct_child<B: AsRef<Path>, N: AsRef<Path>>(
    base: B,
    name: N,
    flags: OpenFlags,
    perm: u32,
) -> Result<Handle, Error> {
    Resolver::default().open_file_direct_child(base, name, flags, perm)
}

/// Open `path` beneath `base` read-only.
///
/// Leading separators are ignored and `..` components are accepted as long as
/// they never climb above `base` (otherwise [`ErrorKind::TraversalRejected`]).
/// A symlink anywhere in `path` fails with [`ErrorKind::SymlinkRejected`].
///
/// [`ErrorKind::TraversalRejected`]: crate::error::ErrorKind::TraversalRejected
/// [`ErrorKind::SymlinkRejected`]: crate::error::ErrorKind::SymlinkRejected
pub fn open_beneath<B: AsRef<Path>, P: AsRef<Path>>(base: B, path: P) -> Result<Handle, Error> {
    Resolver::default().open_beneath(base, path)
}

/// Create (or truncate) `path` beneath `base`, opened read-write with
/// permissions `0o666` before the umask.
pub fn create_beneath<B: AsRef<Path>, P: AsRef<Path>>(base: B, path: P) -> Result<Handle, Error> {
    Resolver::default().create_beneath(base, path)
}

/// Open `path` beneath `base` with arbitrary flags.
pub fn open_file_beneath<B: AsRef<Path>, P: AsRef<Path>>(
    base: B,
    path: P,
    flags: OpenFlags,
    perm: u32,
) -> Result<Handle, Error> {
    Resolver::default().open_file_beneath(base, path, flags, perm)
}

/// Read the whole direct child `name` of `base`.
pub fn read_direct_child<B: AsRef<Path>, N: AsRef<Path>>(base: B, name: N) -> Result<Vec<u8>, Error> {
    Resolver::default().read_direct_child(base, name)
}

/// Write `data` to the direct child `name` of `base`, replacing its contents.
pub fn write_direct_child<B: AsRef<Path>, N: AsRef<Path>, D: AsRef<[u8]>>(
    base: B,
    name: N,
    data: D,
    perm: u32,
) -> Result<(), Error> {
    Resolver::default().write_direct_child(base, name, data, perm)
}

/// Read the whole file at `path` beneath `base`.
pub fn read_beneath<B: AsRef<Path>, P: AsRef<Path>>(base: B, path: P) -> Result<Vec<u8>, Error> {
    Resolver::default().read_beneath(base, path)
}

/// Write `data` to `path` beneath `base`, replacing its contents.
pub fn write_beneath<B: AsRef<Path>, P: AsRef<Path>, D: AsRef<[u8]>>(
    base: B,
    path: P,
    data: D,
    perm: u32,
) -> Result<(), Error> {
    Resolver::default().write_beneath(base, path, data, perm)
}
