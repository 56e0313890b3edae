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

// We need to permit unsafe code because we are interacting with libc APIs.
#![allow(unsafe_code)]

use crate::{flags::OpenFlags, utils::ToCString};

use std::{
    fmt,
    fs::File,
    io::Error as IOError,
    os::unix::io::{FromRawFd, RawFd},
    path::{Path, PathBuf},
};

use libc::{c_int, c_uint, mode_t};
use snafu::Snafu;

/// Representation of a file descriptor and its associated path at a given point
/// in time.
///
/// This is primarily used to make pretty-printing syscall arguments much nicer,
/// and users really shouldn't be interacting with this directly.
///
/// # Caveats
/// Note that the file descriptor value is very unlikely to reference a live
/// file descriptor. Its value is only used for informational purposes.
#[derive(Clone, Debug)]
pub(crate) struct FrozenFd(c_int, Option<PathBuf>);

impl From<RawFd> for FrozenFd {
    fn from(fd: RawFd) -> Self {
        Self(fd, fd_path_lossy(fd))
    }
}

/// Best-effort lookup of the path an fd references, only used for error
/// messages.
#[cfg(target_os = "linux")]
fn fd_path_lossy(fd: RawFd) -> Option<PathBuf> {
    if fd < 0 {
        return None;
    }
    std::fs::read_link(format!("/proc/self/fd/{fd}")).ok()
}

#[cfg(not(target_os = "linux"))]
fn fd_path_lossy(_fd: RawFd) -> Option<PathBuf> {
    None
}

impl fmt::Display for FrozenFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            libc::AT_FDCWD => write!(f, "[AT_FDCWD]")?,
            fd => write!(f, "[{fd}]")?,
        };
        match &self.1 {
            Some(path) => write!(f, "{path:?}")?,
            None => write!(f, "<unknown>")?,
        };
        Ok(())
    }
}

/// Internal error returned by safeopen's syscall wrappers.
///
/// The primary thing of note is that these errors contain detailed debugging
/// information about the arguments to each given syscall. Users would most
/// often not interact with these error variants directly and instead would make
/// use of the top-level [`Error`] type.
///
/// [`Error`]: crate::error::Error
#[derive(Snafu, Debug)]
pub(crate) enum Error {
    #[snafu(display("openat({dirfd}, {path:?}, 0x{flags:x}, 0o{mode:o})"))]
    Openat {
        dirfd: FrozenFd,
        path: PathBuf,
        flags: OpenFlags,
        mode: u32,
        source: IOError,
    },

    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    #[snafu(display("openat2({dirfd}, {path:?}, {how}, {size})"))]
    Openat2 {
        dirfd: FrozenFd,
        path: PathBuf,
        how: OpenHow,
        size: usize,
        source: IOError,
    },

    #[snafu(display("fstatat({dirfd}, {path:?}, 0x{flags:x})"))]
    Fstatat {
        dirfd: FrozenFd,
        path: PathBuf,
        flags: i32,
        source: IOError,
    },
}

impl Error {
    pub(crate) fn root_cause(&self) -> &IOError {
        match self {
            Error::Openat { source, .. } => source,
            Error::Openat2 { source, .. } => source,
            Error::Fstatat { source, .. } => source,
        }
    }
}

/// Wrapper for `openat(2)` which auto-sets `O_CLOEXEC | O_NOCTTY`.
///
/// This is needed because Rust doesn't provide a way to access the dirfd
/// argument of `openat(2)`. We need the dirfd argument, so we need a wrapper.
pub(crate) fn openat_follow<P: AsRef<Path>>(
    dirfd: RawFd,
    path: P,
    flags: c_int,
    mode: mode_t,
) -> Result<File, Error> {
    let path = path.as_ref();
    let flags = libc::O_CLOEXEC | libc::O_NOCTTY | flags;

    // SAFETY: Obviously safe-to-use syscall. The mode is passed as c_uint to
    //         match default argument promotion for the variadic argument.
    let fd = unsafe {
        libc::openat(
            dirfd,
            path.to_c_string().as_ptr(),
            flags,
            mode as c_uint,
        )
    };
    let err = IOError::last_os_error();

    if fd >= 0 {
        // SAFETY: We know it's a real file descriptor.
        Ok(unsafe { File::from_raw_fd(fd) })
    } else {
        Err(Error::Openat {
            dirfd: dirfd.into(),
            path: path.into(),
            flags: OpenFlags::from_bits_retain(flags),
            mode: mode.into(),
            source: err,
        })
    }
}

/// Wrapper for `openat(2)` which auto-sets `O_CLOEXEC | O_NOCTTY | O_NOFOLLOW`.
///
/// This is needed because Rust doesn't provide a way to access the dirfd
/// argument of `openat(2)`. We need the dirfd argument, so we need a wrapper.
pub(crate) fn openat<P: AsRef<Path>>(
    dirfd: RawFd,
    path: P,
    flags: c_int,
    mode: mode_t,
) -> Result<File, Error> {
    openat_follow(dirfd, path, libc::O_NOFOLLOW | flags, mode)
}

/// Wrapper for `fstatat(2)` with `AT_SYMLINK_NOFOLLOW`.
///
/// This is needed because Rust doesn't provide any interface for `fstatat(2)`.
pub(crate) fn fstatat<P: AsRef<Path>>(dirfd: RawFd, path: P) -> Result<libc::stat, Error> {
    // SAFETY: repr(C) struct without internal references is definitely valid. C
    //         callers are expected to zero it as well.
    let mut buf: libc::stat = unsafe { std::mem::zeroed() };
    let path = path.as_ref();
    let flags = libc::AT_SYMLINK_NOFOLLOW;

    // SAFETY: Obviously safe-to-use syscall.
    let ret = unsafe {
        libc::fstatat(
            dirfd,
            path.to_c_string().as_ptr(),
            &mut buf as *mut libc::stat,
            flags,
        )
    };
    let err = IOError::last_os_error();

    if ret >= 0 {
        Ok(buf)
    } else {
        Err(Error::Fstatat {
            dirfd: dirfd.into(),
            path: path.into(),
            flags,
            source: err,
        })
    }
}

/// Arguments for how `openat2` should open the target path.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
#[repr(C)]
#[derive(Clone, Debug, Default)]
pub(crate) struct OpenHow {
    /// O_* flags (`-EINVAL` on unknown or incompatible flags).
    pub(crate) flags: u64,
    /// O_CREAT or O_TMPFILE file mode (must be zero otherwise).
    pub(crate) mode: u64,
    /// RESOLVE_* flags (`-EINVAL` on unknown flags).
    pub(crate) resolve: u64,
}

impl fmt::Display for OpenHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // self.flags
        write!(f, "{{ flags: 0x{:x}, ", self.flags)?;
        if self.flags & libc::O_CREAT as u64 != 0 {
            write!(f, "mode: 0o{:o}, ", self.mode)?;
        }
        // self.resolve
        write!(f, "resolve: 0x{:x} }}", self.resolve)
    }
}

/// Wrapper for `openat2(2)` which auto-sets `O_CLOEXEC`, plus `O_NOCTTY`
/// unless `O_PATH` was requested.
///
/// There is no libc wrapper for `openat2(2)` so this goes through
/// `syscall(2)` directly.
#[cfg(target_os = "linux")]
pub(crate) fn openat2<P: AsRef<Path>>(dirfd: RawFd, path: P, how: &OpenHow) -> Result<File, Error> {
    let path = path.as_ref();

    // openat2(2) fails with -EINVAL for O_PATH combined with anything outside
    // O_DIRECTORY | O_NOFOLLOW | O_CLOEXEC.
    let mut how = how.clone();
    how.flags |= libc::O_CLOEXEC as u64;
    if how.flags & libc::O_PATH as u64 == 0 {
        how.flags |= libc::O_NOCTTY as u64;
    }

    // SAFETY: Obviously safe-to-use Linux syscall.
    let fd = unsafe {
        libc::syscall(
            libc::SYS_openat2,
            dirfd,
            path.to_c_string().as_ptr(),
            &how as *const OpenHow,
            std::mem::size_of::<OpenHow>(),
        )
    } as RawFd;
    let err = IOError::last_os_error();

    if fd >= 0 {
        // SAFETY: We know it's a real file descriptor.
        Ok(unsafe { File::from_raw_fd(fd) })
    } else {
        Err(Error::Openat2 {
            dirfd: dirfd.into(),
            path: path.into(),
            how,
            size: std::mem::size_of::<OpenHow>(),
            source: err,
        })
    }
}
