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

//! Portable segment walk.
//!
//! Every intermediate component is opened with
//! `O_RDONLY|O_DIRECTORY|O_NOFOLLOW` relative to the previous one, so a
//! symlink anywhere in the path makes the walk fail instead of being
//! followed. Only one directory descriptor opened by the walk is alive at a
//! time. The borrowed base descriptor is never closed.

use crate::{
    error::{Error, ErrorImpl},
    flags::OpenFlags,
    path::PathSegments,
    syscalls,
    utils::MaybeOwnedFd,
};

use std::{
    ffi::OsStr,
    fs::File,
    os::unix::io::{BorrowedFd, RawFd},
    path::{Path, PathBuf},
};

/// Open `segments` beneath `base`, one component at a time.
pub(crate) fn open(
    base: BorrowedFd<'_>,
    segments: &PathSegments,
    flags: OpenFlags,
    perm: u32,
) -> Result<File, Error> {
    let (dirs, leaf) = segments.split_last();
    let mut current: MaybeOwnedFd<'_, File> = MaybeOwnedFd::BorrowedFd(base);
    let mut walked = PathBuf::new();

    for dir in dirs {
        walked.push(dir);
        log::trace!("legacy walk: descending into {walked:?}");
        let next = syscalls::openat(
            current.as_raw_fd(),
            dir,
            libc::O_RDONLY | libc::O_DIRECTORY,
            0,
        )
        .map_err(|err| classify(current.as_raw_fd(), dir, &walked, segments, err))?;
        // Dropping the previous intermediate closes it.
        current = MaybeOwnedFd::OwnedFd(next);
    }

    walked.push(leaf);
    log::trace!("legacy walk: opening leaf {walked:?} with {flags:?}");
    syscalls::openat(current.as_raw_fd(), leaf, flags.bits(), mode_bits(perm))
        .map_err(|err| classify(current.as_raw_fd(), leaf, &walked, segments, err))
}

fn mode_bits(perm: u32) -> libc::mode_t {
    // Only permission bits, so the cast cannot truncate on 16-bit mode_t.
    (perm & 0o7777) as libc::mode_t
}

/// Turn a failed `openat` of `name` (relative to `dirfd`) into a public error.
///
/// `O_NOFOLLOW` hits are reported with different errnos depending on the
/// kernel and on whether `O_DIRECTORY` was set (`ELOOP`, `ENOTDIR` on Linux,
/// `EMLINK` on FreeBSD), so the component is re-examined to decide whether it
/// really was a symlink. The re-check only affects which error is returned.
fn classify(
    dirfd: RawFd,
    name: &OsStr,
    component: &Path,
    segments: &PathSegments,
    err: syscalls::Error,
) -> Error {
    let errno = err.root_cause().raw_os_error();
    if matches!(errno, Some(libc::ELOOP | libc::ENOTDIR | libc::EMLINK)) {
        match syscalls::fstatat(dirfd, name) {
            Ok(stat) if stat.st_mode & libc::S_IFMT == libc::S_IFLNK => {
                log::debug!("legacy walk: rejecting symlink {component:?}");
                return ErrorImpl::SymlinkRejected {
                    path: segments.to_path_buf(),
                    component: component.into(),
                }
                .into();
            }
            Ok(_) => {}
            Err(stat_err) => log::trace!("legacy walk: could not re-check {component:?}: {stat_err}"),
        }
    }
    ErrorImpl::RawOsError {
        operation: "open path component".into(),
        source: err,
    }
    .into()
}
