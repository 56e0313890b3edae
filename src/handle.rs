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

use crate::{
    error::{Error, ErrorImpl},
    flags::OpenFlags,
};

use std::{
    fs::{File, Metadata},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
#[cfg(windows)]
use std::os::windows::io::{AsHandle, AsRawHandle, BorrowedHandle, OwnedHandle, RawHandle};

/// An open file that was resolved safely beneath a base directory.
///
/// A [`Handle`] behaves like an ordinary [`File`] (it implements [`Read`],
/// [`Write`] and [`Seek`]) and also remembers the [`OpenFlags`] it was
/// requested with.
///
/// The [`Handle::path`] is only a hint for diagnostics, built from the base
/// directory and the normalised relative path. It is **not** re-resolved, and
/// re-opening it with ordinary path-based APIs gives none of the guarantees
/// safeopen provides.
#[derive(Debug)]
pub struct Handle {
    inner: File,
    flags: OpenFlags,
    path: PathBuf,
}

impl Handle {
    pub(crate) fn new(inner: File, flags: OpenFlags, path: PathBuf) -> Self {
        Self { inner, flags, path }
    }

    /// The flags this handle was requested with.
    #[inline]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Diagnostic path of the opened file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying [`File`].
    #[inline]
    pub fn as_file(&self) -> &File {
        &self.inner
    }

    /// Unwrap a [`Handle`] to reveal the underlying [`File`].
    pub fn into_file(self) -> File {
        self.inner
    }

    /// Create a copy of an existing [`Handle`].
    ///
    /// The new handle is completely independent from the original, but
    /// references the same underlying file (and shares its file offset).
    pub fn try_clone(&self) -> Result<Self, Error> {
        let inner = self.inner.try_clone().map_err(|err| ErrorImpl::OsError {
            operation: "clone handle".into(),
            source: err,
        })?;
        Ok(Self {
            inner,
            flags: self.flags,
            path: self.path.clone(),
        })
    }

    /// Query metadata about the opened file.
    pub fn metadata(&self) -> Result<Metadata, Error> {
        self.inner.metadata().map_err(|err| {
            ErrorImpl::OsError {
                operation: "fstat handle".into(),
                source: err,
            }
            .into()
        })
    }
}

impl Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Read for &Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.inner).read(buf)
    }
}

impl Write for Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Write for &Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.inner).flush()
    }
}

impl Seek for Handle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Seek for &Handle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (&self.inner).seek(pos)
    }
}

impl From<Handle> for File {
    fn from(handle: Handle) -> Self {
        handle.inner
    }
}

#[cfg(unix)]
impl AsFd for Handle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

#[cfg(unix)]
impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

#[cfg(unix)]
impl From<Handle> for OwnedFd {
    fn from(handle: Handle) -> Self {
        handle.inner.into()
    }
}

#[cfg(windows)]
impl AsHandle for Handle {
    fn as_handle(&self) -> BorrowedHandle<'_> {
        self.inner.as_handle()
    }
}

#[cfg(windows)]
impl AsRawHandle for Handle {
    fn as_raw_handle(&self) -> RawHandle {
        self.inner.as_raw_handle()
    }
}

#[cfg(windows)]
impl From<Handle> for OwnedHandle {
    fn from(handle: Handle) -> Self {
        handle.inner.into()
    }
}
