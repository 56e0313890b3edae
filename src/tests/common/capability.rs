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

use crate::{
    resolvers::openat2::{self, Capability},
    syscalls::{self, OpenHow},
};

use std::sync::{Mutex, MutexGuard};

// The openat2 capability is process-wide, so every test that depends on it or
// forces it has to hold this lock.
static CAPABILITY_LOCK: Mutex<()> = Mutex::new(());

pub(in crate::tests) fn lock_capability() -> MutexGuard<'static, ()> {
    CAPABILITY_LOCK
        .lock()
        .unwrap_or_else(|err| err.into_inner())
}

/// Does the running kernel have `openat2(2)` at all? Checked with a plain
/// request (no resolve flags) so the answer doesn't depend on the probe.
pub(in crate::tests) fn kernel_has_openat2() -> bool {
    match syscalls::openat2(libc::AT_FDCWD, ".", &OpenHow::default()) {
        Ok(_) => true,
        Err(err) => err.root_cause().raw_os_error() != Some(libc::ENOSYS),
    }
}

/// Forget the cached capability and probe again, retrying probes that raced
/// with a rename. Caller must hold [`lock_capability`].
pub(in crate::tests) fn reprobe_openat2() -> bool {
    for _ in 0..16 {
        openat2::set_capability(Capability::Unknown);
        let supported = openat2::is_supported();
        if openat2::capability() != Capability::Unknown {
            return supported;
        }
    }
    false
}
