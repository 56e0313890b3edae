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

use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};

/// Like [`std::borrow::Cow`] but without the [`ToOwned`] requirement, and only
/// for file descriptors.
///
/// The segment walk starts from a directory it does not own (the caller's
/// base) and then replaces it with directories it opened itself. Holding the
/// current directory as a `MaybeOwnedFd` means assigning a new value drops
/// (and closes) the previous intermediate, while the borrowed base is never
/// closed.
///
/// [`ToOwned`]: std::borrow::ToOwned
#[derive(Debug)]
pub(crate) enum MaybeOwnedFd<'fd, Fd>
where
    Fd: 'fd + AsFd,
{
    OwnedFd(Fd),
    BorrowedFd(BorrowedFd<'fd>),
}

impl<'fd, Fd> MaybeOwnedFd<'fd, Fd>
where
    Fd: AsFd,
{
    pub(crate) fn as_raw_fd(&self) -> RawFd {
        match self {
            MaybeOwnedFd::OwnedFd(fd) => fd.as_fd().as_raw_fd(),
            MaybeOwnedFd::BorrowedFd(fd) => fd.as_raw_fd(),
        }
    }
}
