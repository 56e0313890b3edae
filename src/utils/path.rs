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

// Windows needs unsafe to rebuild an OsStr from its encoded bytes.
#![allow(unsafe_code)]

use std::ffi::OsStr;
#[cfg(unix)]
use std::{ffi::CString, os::unix::ffi::OsStrExt, path::Path};

#[cfg(unix)]
pub(crate) trait ToCString {
    /// Convert to a CStr.
    fn to_c_string(&self) -> CString;
}

#[cfg(unix)]
impl ToCString for OsStr {
    fn to_c_string(&self) -> CString {
        let bytes = self.as_bytes();
        let bytes = match memchr::memchr(b'\0', bytes) {
            Some(idx) => &bytes[..idx],
            None => bytes,
        };
        CString::new(bytes).expect("nul bytes should've been excluded")
    }
}

#[cfg(unix)]
impl ToCString for Path {
    fn to_c_string(&self) -> CString {
        self.as_os_str().to_c_string()
    }
}

/// Byte view of an [`OsStr`], used for separator scanning.
///
/// On Windows this is the WTF-8 encoded form, where every ASCII byte is a real
/// ASCII character.
pub(crate) trait OsStrBytes {
    fn as_os_bytes(&self) -> &[u8];
}

impl OsStrBytes for OsStr {
    #[cfg(unix)]
    fn as_os_bytes(&self) -> &[u8] {
        self.as_bytes()
    }

    #[cfg(windows)]
    fn as_os_bytes(&self) -> &[u8] {
        self.as_encoded_bytes()
    }
}

/// Inverse of [`OsStrBytes::as_os_bytes`].
///
/// The bytes must be a sub-slice of [`OsStrBytes::as_os_bytes`] split only at
/// ASCII bytes.
#[cfg(unix)]
pub(crate) fn os_str_from_bytes(bytes: &[u8]) -> &OsStr {
    OsStr::from_bytes(bytes)
}

/// Inverse of [`OsStrBytes::as_os_bytes`].
///
/// The bytes must be a sub-slice of [`OsStrBytes::as_os_bytes`] split only at
/// ASCII bytes.
#[cfg(windows)]
pub(crate) fn os_str_from_bytes(bytes: &[u8]) -> &OsStr {
    // SAFETY: Callers only split encoded bytes at ASCII separators, which is
    //         explicitly permitted by OsStr::from_encoded_bytes_unchecked.
    unsafe { OsStr::from_encoded_bytes_unchecked(bytes) }
}
