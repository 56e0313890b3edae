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

//! `openat2(2)` fast path.
//!
//! A single `openat2(RESOLVE_BENEATH | RESOLVE_NO_SYMLINKS)` call gives the
//! same guarantees as the [`legacy`] walk. Whether the running kernel supports
//! it is probed once and cached for the whole process, and any call that the
//! kernel cannot service is handed to the [`legacy`] walk with the same
//! inputs.
//!
//! [`legacy`]: crate::resolvers::legacy

use crate::{
    error::{Error, ErrorImpl},
    flags::OpenFlags,
    path::PathSegments,
    resolvers::legacy,
    syscalls::{self, OpenHow},
};

use std::{
    fs::File,
    os::unix::io::{AsRawFd, BorrowedFd},
    sync::atomic::{AtomicU8, Ordering},
};

/// Whether `openat2(2)` is usable on this system.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum Capability {
    /// Not probed yet.
    Unknown = 0,
    Supported = 1,
    Unsupported = 2,
}

impl From<u8> for Capability {
    fn from(value: u8) -> Self {
        match value {
            1 => Capability::Supported,
            2 => Capability::Unsupported,
            _ => Capability::Unknown,
        }
    }
}

// Concurrent first users may all probe. They store the same answer, so the
// last writer winning is harmless.
static OPENAT2_CAPABILITY: AtomicU8 = AtomicU8::new(Capability::Unknown as u8);

/// Maximum number of `EAGAIN` retries before giving up on the fast path.
const MAX_EAGAIN_RETRIES: usize = 16;

pub(crate) fn capability() -> Capability {
    OPENAT2_CAPABILITY.load(Ordering::Acquire).into()
}

fn store_capability(state: Capability) {
    OPENAT2_CAPABILITY.store(state as u8, Ordering::Release);
}

/// Force the cached capability. Only for tests.
#[cfg(test)]
pub(crate) fn set_capability(state: Capability) {
    store_capability(state)
}

/// Is `openat2(2)` supported? Probes the kernel on first use.
pub(crate) fn is_supported() -> bool {
    match capability() {
        Capability::Supported => true,
        Capability::Unsupported => false,
        Capability::Unknown => probe(),
    }
}

fn probe() -> bool {
    // Same request as a plain open of the cwd, so only the resolve flags can
    // make an otherwise working kernel refuse it.
    let how = OpenHow {
        flags: libc::O_RDONLY as u64,
        resolve: libc::RESOLVE_BENEATH | libc::RESOLVE_NO_SYMLINKS,
        ..Default::default()
    };
    let verdict = match syscalls::openat2(libc::AT_FDCWD, ".", &how) {
        Ok(_) => Some(Capability::Supported),
        Err(err) => {
            log::debug!("openat2 probe failed: {err}");
            probe_verdict(err.root_cause().raw_os_error())
        }
    };
    match verdict {
        Some(state) => {
            log::debug!("openat2 probe result: {state:?}");
            store_capability(state);
            state == Capability::Supported
        }
        None => {
            log::debug!("openat2 probe raced with a rename, probing again later");
            false
        }
    }
}

/// Map a failed probe's errno to the capability it proves. `None` means the
/// failure was transient and nothing should be cached.
fn probe_verdict(errno: Option<i32>) -> Option<Capability> {
    match errno {
        // EOPNOTSUPP and ENOTSUP are the same value on Linux.
        Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP) | Some(libc::E2BIG) | Some(libc::EINVAL) => {
            Some(Capability::Unsupported)
        }
        Some(libc::EAGAIN) => None,
        // Any other failure (an unreadable or deleted cwd) still means the
        // syscall exists and understood the request.
        _ => Some(Capability::Supported),
    }
}

fn build_how(flags: OpenFlags, perm: u32) -> OpenHow {
    let oflags = flags | OpenFlags::O_NOFOLLOW;
    // The kernel rejects a non-zero mode without O_CREAT or O_TMPFILE.
    let wants_mode = flags.contains(OpenFlags::O_CREAT)
        || flags.bits() & libc::O_TMPFILE == libc::O_TMPFILE;
    OpenHow {
        flags: oflags.bits() as libc::c_uint as u64,
        mode: if wants_mode { (perm & 0o7777) as u64 } else { 0 },
        resolve: libc::RESOLVE_BENEATH | libc::RESOLVE_NO_SYMLINKS | libc::RESOLVE_NO_MAGICLINKS,
    }
}

/// Open `segments` beneath `base` with a single `openat2(2)`, falling back to
/// the legacy walk when the kernel can't do it.
pub(crate) fn open(
    base: BorrowedFd<'_>,
    segments: &PathSegments,
    flags: OpenFlags,
    perm: u32,
) -> Result<File, Error> {
    if !is_supported() {
        log::trace!("openat2 unsupported, using the legacy walk");
        return legacy::open(base, segments, flags, perm);
    }

    let path = segments.to_path_buf();
    let how = build_how(flags, perm);

    // openat2(2) can fail with -EAGAIN if there was a racing rename or mount
    // *anywhere on the system*. This can happen pretty frequently, so what we
    // do is attempt the openat2(2) a couple of times before letting the
    // legacy walk have a go.
    for _ in 0..MAX_EAGAIN_RETRIES {
        match syscalls::openat2(base.as_raw_fd(), &path, &how) {
            Ok(file) => return Ok(file),
            Err(err) => match err.root_cause().raw_os_error() {
                // EOPNOTSUPP and ENOTSUP are the same value on Linux.
                Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP) | Some(libc::E2BIG) => {
                    log::debug!("openat2 not supported by the kernel ({err}), using the legacy walk");
                    store_capability(Capability::Unsupported);
                    return legacy::open(base, segments, flags, perm);
                }
                Some(libc::EINVAL) => {
                    // Could be flags this kernel's openat2 dislikes rather
                    // than missing support, so nothing is recorded.
                    log::debug!("openat2 rejected the arguments ({err}), using the legacy walk");
                    return legacy::open(base, segments, flags, perm);
                }
                Some(libc::EAGAIN) => continue,
                Some(libc::ELOOP) => {
                    log::debug!("openat2: rejecting symlink in {path:?}");
                    return Err(ErrorImpl::SymlinkRejected {
                        component: path.clone(),
                        path,
                    }
                    .into());
                }
                Some(libc::EXDEV) => {
                    log::debug!("openat2: {path:?} escapes the base directory");
                    return Err(ErrorImpl::TraversalRejected { path }.into());
                }
                _ => {
                    return Err(ErrorImpl::RawOsError {
                        operation: "openat2 beneath base".into(),
                        source: err,
                    }
                    .into())
                }
            },
        }
    }

    log::debug!("openat2 kept failing with EAGAIN, using the legacy walk");
    legacy::open(base, segments, flags, perm)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn capability_roundtrip_u8() {
        for state in [
            Capability::Unknown,
            Capability::Supported,
            Capability::Unsupported,
        ] {
            assert_eq!(Capability::from(state as u8), state);
        }
        assert_eq!(Capability::from(42), Capability::Unknown);
    }

    #[test]
    fn how_mode_only_with_creat() {
        let how = build_how(OpenFlags::O_RDONLY, 0o644);
        assert_eq!(how.mode, 0, "mode must be zero without O_CREAT");
        assert_ne!(how.flags & libc::O_NOFOLLOW as u64, 0, "O_NOFOLLOW is always set");

        let how = build_how(OpenFlags::O_RDWR | OpenFlags::O_CREAT, 0o100644);
        assert_eq!(how.mode, 0o644, "only permission bits are passed");
    }

    #[test]
    fn probe_verdict_mapping() {
        for errno in [libc::ENOSYS, libc::EOPNOTSUPP, libc::E2BIG, libc::EINVAL] {
            assert_eq!(
                probe_verdict(Some(errno)),
                Some(Capability::Unsupported),
                "errno {errno} means openat2 is unusable"
            );
        }
        assert_eq!(probe_verdict(Some(libc::EAGAIN)), None, "EAGAIN is transient");
        for errno in [libc::ENOENT, libc::EACCES, libc::ENOTDIR] {
            assert_eq!(
                probe_verdict(Some(errno)),
                Some(Capability::Supported),
                "errno {errno} proves the syscall exists"
            );
        }
    }

    #[test]
    fn how_resolve_flags() {
        let how = build_how(OpenFlags::O_RDONLY, 0);
        assert_eq!(
            how.resolve,
            libc::RESOLVE_BENEATH | libc::RESOLVE_NO_SYMLINKS | libc::RESOLVE_NO_MAGICLINKS
        );
    }
}
