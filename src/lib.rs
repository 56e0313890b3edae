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
//! safeopen provides primitives for opening a caller-supplied (and possibly
//! attacker-influenced) relative path underneath a trusted base directory,
//! without being tricked into escaping it through `..` components or
//! symlinks.
//!
//! Two contracts are offered:
//!
//! * **Direct child** ([`open_direct_child`], [`create_direct_child`],
//!   [`open_file_direct_child`]): the path must be a single component. Any
//!   separator is rejected outright.
//! * **Beneath** ([`open_beneath`], [`create_beneath`], [`open_file_beneath`]):
//!   the path may descend through subdirectories, and `..` is accepted as long
//!   as it never climbs above the base. Leading separators are ignored, so
//!   `/etc/passwd` means `etc/passwd` inside the base.
//!
//! In both cases a symlink (or a reparse point on Windows) anywhere in the
//! relative path makes the open fail with [`ErrorKind::SymlinkRejected`]. The
//! base directory path itself is trusted and may contain symlinks.
//!
//! # Backends
//!
//! On Linux a single `openat2(2)` call with `RESOLVE_BENEATH |
//! RESOLVE_NO_SYMLINKS` is used when the kernel supports it. Otherwise (and on
//! other unix systems) the path is walked one component at a time with
//! `O_NOFOLLOW` directory descriptors. On Windows the walk uses
//! `NtCreateFile` relative to the parent handle. See [`ResolverBackend`] if
//! you need to pick one explicitly.
//!
//! # Examples
//!
//! ```
//! # use std::io::{Read, Write};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let tmpdir = tempfile::TempDir::new()?;
//! # let base = tmpdir.path();
//! # std::fs::create_dir(base.join("subdir"))?;
//! // Create a file inside a subdirectory of the base.
//! let mut handle = safeopen::create_beneath(base, "subdir/hello")?;
//! handle.write_all(b"hello world")?;
//!
//! // And read it back, going through a harmless "..".
//! let mut contents = String::new();
//! safeopen::open_beneath(base, "subdir/../subdir/hello")?.read_to_string(&mut contents)?;
//! assert_eq!(contents, "hello world");
//!
//! // Escaping the base directory is refused.
//! let err = safeopen::open_beneath(base, "../etc/passwd").unwrap_err();
//! assert_eq!(err.kind(), safeopen::error::ErrorKind::TraversalRejected);
//!
//! // Direct children cannot contain separators at all.
//! let err = safeopen::open_direct_child(base, "subdir/hello").unwrap_err();
//! assert_eq!(err.kind(), safeopen::error::ErrorKind::InvalidPath);
//! # Ok(())
//! # }
//! ```
//!
//! [`ErrorKind::SymlinkRejected`]: error::ErrorKind::SymlinkRejected

// safeopen only knows how to resolve paths on unix and Windows.
#![cfg(any(unix, windows))]
// Only the syscall wrappers need unsafe.
#![deny(unsafe_code)]

#[macro_use]
extern crate bitflags;

// `Handle` implementation.
mod handle;
#[doc(inline)]
pub use handle::*;

// Public open operations.
mod open;
#[doc(inline)]
pub use open::*;

// `Error` definitions.
pub mod error;

// `OpenFlags` definition.
pub mod flags;
#[doc(inline)]
pub use flags::OpenFlags;

// Relative path validation.
mod path;
#[doc(inline)]
pub use path::ResolutionMode;

// Backend resolver implementations.
mod resolvers;
#[doc(inline)]
pub use resolvers::{Resolver, ResolverBackend};

// Internally used helpers.
mod syscalls;
mod utils;
