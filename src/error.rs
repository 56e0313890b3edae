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

//! Error types for safeopen.

use crate::syscalls::Error as SyscallError;

use std::{
    borrow::Cow,
    error::Error as StdError,
    fmt,
    io::{Error as IOError, ErrorKind as IOErrorKind},
    path::PathBuf,
};

use snafu::Snafu;

/// Opaque error type for safeopen.
///
/// If you wish to do non-trivial error handling with safeopen errors, use
/// [`Error::kind`] to get an [`ErrorKind`] you can handle programmatically.
#[derive(Debug)]
pub struct Error(Box<ErrorImpl>);

impl<E: Into<ErrorImpl>> From<E> for Error {
    #[doc(hidden)]
    fn from(err: E) -> Self {
        Self(Box::new(err.into()))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl Error {
    /// Get the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    /// The raw OS error code of the underlying system call, if there was one.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.0.raw_os_error()
    }
}

impl From<Error> for IOError {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::InvalidPath => IOErrorKind::InvalidInput,
            ErrorKind::TraversalRejected | ErrorKind::SymlinkRejected => {
                IOErrorKind::PermissionDenied
            }
            ErrorKind::NotFound => IOErrorKind::NotFound,
            ErrorKind::PermissionDenied => IOErrorKind::PermissionDenied,
            ErrorKind::OsError(Some(errno)) => IOError::from_raw_os_error(errno).kind(),
            ErrorKind::OsError(None) => IOErrorKind::Other,
        };
        IOError::new(kind, err)
    }
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum ErrorImpl {
    #[snafu(display("invalid path {path:?}: {description}"))]
    InvalidPath {
        path: PathBuf,
        description: Cow<'static, str>,
    },

    #[snafu(display("path {path:?} escapes the base directory"))]
    TraversalRejected { path: PathBuf },

    #[snafu(display("refusing to resolve symlink {component:?} in {path:?}"))]
    SymlinkRejected { path: PathBuf, component: PathBuf },

    #[snafu(display("{operation} failed"))]
    OsError {
        operation: Cow<'static, str>,
        source: IOError,
    },

    #[snafu(display("{operation} failed"))]
    RawOsError {
        operation: Cow<'static, str>,
        source: SyscallError,
    },

    #[snafu(display("{description}"))]
    Wrapped {
        description: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

/// Underlying error class for safeopen errors.
///
/// This is similar in concept to [`std::io::ErrorKind`]. Errors coming from
/// the operating system that don't fit one of the dedicated kinds are
/// reported as [`ErrorKind::OsError`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The path given to safeopen is malformed for the requested operation
    /// (a separator where none is allowed, an empty path, an illegal
    /// character).
    InvalidPath,
    /// The path would resolve to something outside of the base directory.
    TraversalRejected,
    /// A symlink (or reparse point on Windows) was found while resolving the
    /// path.
    SymlinkRejected,
    /// Some component of the path does not exist.
    NotFound,
    /// The operating system refused access to some component of the path.
    PermissionDenied,
    /// Any other error from a system call. The provided value is the
    /// numerical value of the OS error, if available.
    OsError(Option<i32>),
}

impl ErrorImpl {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::TraversalRejected { .. } => ErrorKind::TraversalRejected,
            Self::SymlinkRejected { .. } => ErrorKind::SymlinkRejected,
            // Any syscall-related errors get mapped by the io::ErrorKind, since
            // the distinction between the wrappers doesn't matter to users.
            Self::OsError { source, .. } => io_error_kind(source),
            Self::RawOsError { source, .. } => io_error_kind(source.root_cause()),
            Self::Wrapped { source, .. } => source.kind(),
        }
    }

    pub(crate) fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::OsError { source, .. } => source.raw_os_error(),
            Self::RawOsError { source, .. } => source.root_cause().raw_os_error(),
            Self::Wrapped { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

fn io_error_kind(err: &IOError) -> ErrorKind {
    match err.kind() {
        IOErrorKind::NotFound => ErrorKind::NotFound,
        IOErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::OsError(err.raw_os_error()),
    }
}

#[cfg(unix)]
impl ErrorKind {
    /// Return a C-like errno for the [`ErrorKind`].
    ///
    /// Aside from fetching the errno represented by standard
    /// [`ErrorKind::OsError`] errors, pure-Rust errors are also mapped to C
    /// errno values where appropriate.
    pub fn errno(&self) -> Option<i32> {
        match self {
            ErrorKind::InvalidPath => Some(libc::EINVAL),
            ErrorKind::TraversalRejected => Some(libc::EXDEV),
            ErrorKind::SymlinkRejected => Some(libc::ELOOP),
            ErrorKind::NotFound => Some(libc::ENOENT),
            ErrorKind::PermissionDenied => Some(libc::EACCES),
            ErrorKind::OsError(errno) => *errno,
        }
    }
}

// Private trait necessary to work around the "orphan trait" restriction.
pub(crate) trait ErrorExt: Sized {
    /// Wrap a `Result<..., Error>` with an additional context string.
    fn wrap<S: Into<String>>(self, context: S) -> Self {
        self.with_wrap(|| context.into())
    }

    /// Wrap a `Result<..., Error>` with an additional context string created by
    /// a closure.
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String;
}

impl ErrorExt for ErrorImpl {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        Self::Wrapped {
            description: context_fn().into(),
            source: self.into(),
        }
    }
}

impl ErrorExt for Error {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        (*self.0).with_wrap(context_fn).into()
    }
}

impl<T, E: ErrorExt> ErrorExt for Result<T, E> {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| err.with_wrap(context_fn))
    }
}
