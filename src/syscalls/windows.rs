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

// We need to permit unsafe code because we are interacting with the NT API.
#![allow(unsafe_code)]

use std::{
    ffi::OsStr,
    io::Error as IOError,
    mem,
    os::windows::{
        ffi::OsStrExt,
        io::{AsRawHandle, BorrowedHandle, FromRawHandle, OwnedHandle, RawHandle},
    },
    path::PathBuf,
    ptr,
};

use snafu::Snafu;
use windows_sys::{
    Wdk::{Foundation::OBJECT_ATTRIBUTES, Storage::FileSystem::NtCreateFile},
    Win32::{
        Foundation::{RtlNtStatusToDosError, ERROR_FILENAME_EXCED_RANGE, HANDLE, UNICODE_STRING},
        Storage::FileSystem::{
            GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION, FILE_ATTRIBUTE_NORMAL,
            FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
        },
        System::IO::IO_STATUS_BLOCK,
    },
};

/// Internal error returned by safeopen's NT API wrappers.
///
/// Like the unix wrappers, the variants keep the arguments of the failed call
/// around for debugging. Handle values are only informational.
#[derive(Snafu, Debug)]
pub(crate) enum Error {
    #[snafu(display(
        "NtCreateFile([{root:#x}], {path:?}, access=0x{access:x}, disposition={disposition}, options=0x{options:x}) = 0x{status:08x}"
    ))]
    NtCreateFile {
        root: usize,
        path: PathBuf,
        access: u32,
        disposition: u32,
        options: u32,
        status: u32,
        source: IOError,
    },

    #[snafu(display("GetFileInformationByHandle([{handle:#x}])"))]
    GetFileInformation { handle: usize, source: IOError },
}

impl Error {
    pub(crate) fn root_cause(&self) -> &IOError {
        match self {
            Error::NtCreateFile { source, .. } => source,
            Error::GetFileInformation { source, .. } => source,
        }
    }
}

/// Wrapper for `NtCreateFile` opening `name` relative to the directory handle
/// `root`.
///
/// `FILE_OPEN_REPARSE_POINT` is always added to `options`, so a reparse point
/// at `name` is opened as itself rather than traversed. Note that `name` is
/// handed to the object manager as-is, so the caller must make sure it is a
/// single component.
pub(crate) fn nt_create_file(
    root: BorrowedHandle<'_>,
    name: &OsStr,
    access: u32,
    disposition: u32,
    options: u32,
) -> Result<OwnedHandle, Error> {
    use windows_sys::Wdk::Storage::FileSystem::FILE_OPEN_REPARSE_POINT;

    let options = options | FILE_OPEN_REPARSE_POINT;
    let frozen_root = root.as_raw_handle() as usize;

    let mut wide: Vec<u16> = name.encode_wide().collect();
    let byte_len = match u16::try_from(wide.len() * mem::size_of::<u16>()) {
        Ok(len) => len,
        Err(_) => {
            return Err(Error::NtCreateFile {
                root: frozen_root,
                path: name.into(),
                access,
                disposition,
                options,
                status: 0,
                source: IOError::from_raw_os_error(ERROR_FILENAME_EXCED_RANGE as i32),
            })
        }
    };
    let object_name = UNICODE_STRING {
        Length: byte_len,
        MaximumLength: byte_len,
        Buffer: wide.as_mut_ptr(),
    };
    let attrs = OBJECT_ATTRIBUTES {
        Length: mem::size_of::<OBJECT_ATTRIBUTES>() as u32,
        RootDirectory: root.as_raw_handle() as HANDLE,
        ObjectName: &object_name,
        Attributes: 0,
        SecurityDescriptor: ptr::null(),
        SecurityQualityOfService: ptr::null(),
    };
    // SAFETY: IO_STATUS_BLOCK is a plain repr(C) struct, zero is a valid value.
    let mut iosb: IO_STATUS_BLOCK = unsafe { mem::zeroed() };
    let mut handle: HANDLE = ptr::null_mut();

    // SAFETY: All pointers reference live locals for the duration of the call.
    let status = unsafe {
        NtCreateFile(
            &mut handle,
            access,
            &attrs,
            &mut iosb,
            ptr::null(),
            FILE_ATTRIBUTE_NORMAL,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            disposition,
            options,
            ptr::null(),
            0,
        )
    };

    if status >= 0 {
        // SAFETY: NtCreateFile succeeded, so handle is a fresh owned handle.
        Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
    } else {
        // SAFETY: Plain status code conversion.
        let code = unsafe { RtlNtStatusToDosError(status) };
        Err(Error::NtCreateFile {
            root: frozen_root,
            path: name.into(),
            access,
            disposition,
            options,
            status: status as u32,
            source: IOError::from_raw_os_error(code as i32),
        })
    }
}

/// Wrapper for `GetFileInformationByHandle` returning `dwFileAttributes`.
pub(crate) fn file_attributes(handle: BorrowedHandle<'_>) -> Result<u32, Error> {
    // SAFETY: Plain repr(C) struct, zero is a valid value.
    let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { mem::zeroed() };

    // SAFETY: handle is a live handle and info is a valid out-pointer.
    let ok = unsafe { GetFileInformationByHandle(handle.as_raw_handle() as HANDLE, &mut info) };
    let err = IOError::last_os_error();

    if ok != 0 {
        Ok(info.dwFileAttributes)
    } else {
        Err(Error::GetFileInformation {
            handle: handle.as_raw_handle() as usize,
            source: err,
        })
    }
}
