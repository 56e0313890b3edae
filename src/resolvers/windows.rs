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

//! Native Windows walk.
//!
//! Every component is opened with `NtCreateFile` relative to the handle of
//! its parent and with `FILE_OPEN_REPARSE_POINT`, so reparse points
//! (symlinks, junctions, mount points) are opened as themselves and can be
//! rejected instead of followed.

use crate::{
    error::{Error, ErrorImpl},
    flags::OpenFlags,
    path::PathSegments,
    syscalls,
};

use std::{
    ffi::OsStr,
    fs::{File, OpenOptions},
    io::Error as IOError,
    os::windows::{
        fs::OpenOptionsExt,
        io::{AsHandle, BorrowedHandle, OwnedHandle},
    },
    path::{Path, PathBuf},
};

use windows_sys::{
    Wdk::Storage::FileSystem::{
        FILE_CREATE, FILE_DIRECTORY_FILE, FILE_NON_DIRECTORY_FILE, FILE_OPEN, FILE_OPEN_IF,
        FILE_OVERWRITE, FILE_OVERWRITE_IF, FILE_RANDOM_ACCESS, FILE_SYNCHRONOUS_IO_NONALERT,
    },
    Win32::{
        Foundation::ERROR_DIRECTORY,
        Storage::FileSystem::{
            FILE_ATTRIBUTE_REPARSE_POINT, FILE_FLAG_BACKUP_SEMANTICS, FILE_GENERIC_READ,
            FILE_GENERIC_WRITE, FILE_READ_ATTRIBUTES, FILE_TRAVERSE, FILE_WRITE_DATA,
        },
    },
};

/// Open the trusted base directory. Reparse points in the base path itself
/// are followed.
pub(crate) fn open_base(base: &Path) -> Result<File, Error> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(base)
        .map_err(|err| ErrorImpl::OsError {
            operation: "open base directory".into(),
            source: err,
        })?;
    let metadata = file.metadata().map_err(|err| ErrorImpl::OsError {
        operation: "stat base directory".into(),
        source: err,
    })?;
    if !metadata.is_dir() {
        Err(ErrorImpl::OsError {
            operation: "open base directory".into(),
            source: IOError::from_raw_os_error(ERROR_DIRECTORY as i32),
        })?
    }
    Ok(file)
}

/// Translate the `O_CREAT`/`O_EXCL`/`O_TRUNC` combination into an
/// `NtCreateFile` create disposition.
fn create_disposition(flags: OpenFlags) -> u32 {
    let creat = flags.contains(OpenFlags::O_CREAT);
    let excl = flags.contains(OpenFlags::O_EXCL);
    let trunc = flags.contains(OpenFlags::O_TRUNC);
    match (creat, excl, trunc) {
        (true, true, _) => FILE_CREATE,
        (true, false, true) => FILE_OVERWRITE_IF,
        (true, false, false) => FILE_OPEN_IF,
        (false, _, true) => FILE_OVERWRITE,
        (false, _, false) => FILE_OPEN,
    }
}

/// Access mask for the leaf. Read access is always requested.
fn access_mask(flags: OpenFlags) -> u32 {
    let mut access = FILE_GENERIC_READ;
    if flags.wants_write() {
        if flags.contains(OpenFlags::O_APPEND) {
            // Without FILE_WRITE_DATA every write goes to the end of file.
            access |= FILE_GENERIC_WRITE & !FILE_WRITE_DATA;
        } else {
            access |= FILE_GENERIC_WRITE;
        }
    }
    access
}

/// Check whether `name` (relative to `root`) is a reparse point without
/// following it.
fn is_reparse_point(root: BorrowedHandle<'_>, name: &OsStr) -> bool {
    syscalls::nt_create_file(root, name, FILE_READ_ATTRIBUTES, FILE_OPEN, 0)
        .and_then(|handle| syscalls::file_attributes(handle.as_handle()))
        .map(|attrs| attrs & FILE_ATTRIBUTE_REPARSE_POINT != 0)
        .unwrap_or(false)
}

struct Component<'a> {
    name: &'a OsStr,
    walked: &'a Path,
    segments: &'a PathSegments,
}

impl Component<'_> {
    fn symlink_rejected(&self) -> Error {
        log::debug!("nt walk: rejecting reparse point {:?}", self.walked);
        ErrorImpl::SymlinkRejected {
            path: self.segments.to_path_buf(),
            component: self.walked.into(),
        }
        .into()
    }

    fn open(
        &self,
        root: BorrowedHandle<'_>,
        access: u32,
        disposition: u32,
        options: u32,
    ) -> Result<OwnedHandle, Error> {
        let handle = match syscalls::nt_create_file(root, self.name, access, disposition, options)
        {
            Ok(handle) => handle,
            Err(err) => {
                if is_reparse_point(root, self.name) {
                    return Err(self.symlink_rejected());
                }
                Err(ErrorImpl::RawOsError {
                    operation: "open path component".into(),
                    source: err,
                })?
            }
        };

        let attrs = syscalls::file_attributes(handle.as_handle()).map_err(|err| {
            ErrorImpl::RawOsError {
                operation: "inspect path component".into(),
                source: err,
            }
        })?;
        if attrs & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
            // The handle is dropped (and closed) here.
            return Err(self.symlink_rejected());
        }
        Ok(handle)
    }
}

/// Open `segments` beneath `base`, one component at a time.
pub(crate) fn open(
    base: BorrowedHandle<'_>,
    segments: &PathSegments,
    flags: OpenFlags,
) -> Result<File, Error> {
    let (dirs, leaf) = segments.split_last();
    let mut current: Option<OwnedHandle> = None;
    let mut walked = PathBuf::new();

    for dir in dirs {
        walked.push(dir);
        log::trace!("nt walk: descending into {walked:?}");
        let root = current.as_ref().map_or(base, |handle| handle.as_handle());
        let next = Component {
            name: dir,
            walked: &walked,
            segments,
        }
        .open(
            root,
            FILE_GENERIC_READ | FILE_TRAVERSE,
            FILE_OPEN,
            FILE_DIRECTORY_FILE | FILE_SYNCHRONOUS_IO_NONALERT,
        )?;
        current = Some(next);
    }

    walked.push(leaf);
    log::trace!("nt walk: opening leaf {walked:?} with {flags:?}");
    let root = current.as_ref().map_or(base, |handle| handle.as_handle());
    let component = Component {
        name: leaf,
        walked: &walked,
        segments,
    };
    let disposition = create_disposition(flags);
    // Refuse to create over or truncate an existing reparse point.
    if disposition != FILE_OPEN && is_reparse_point(root, leaf) {
        return Err(component.symlink_rejected());
    }
    let handle = component.open(
        root,
        access_mask(flags),
        disposition,
        FILE_NON_DIRECTORY_FILE | FILE_SYNCHRONOUS_IO_NONALERT | FILE_RANDOM_ACCESS,
    )?;
    Ok(File::from(handle))
}
