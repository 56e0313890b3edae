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

//! Lexical validation of caller-supplied relative paths.
//!
//! Nothing in here touches the filesystem. A path is checked and split into
//! [`PathSegments`] before any descriptor is opened, so malformed or escaping
//! input is rejected without side effects.

use crate::{
    error::{Error, InvalidPathSnafu, TraversalRejectedSnafu},
    utils::{self, OsStrBytes},
};

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// How a relative path is allowed to reach its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionMode {
    /// The path must name an entry directly inside the base directory. Any
    /// separator (or `.` and `..`) is rejected.
    DirectChild,
    /// The path may descend through subdirectories, as long as it never
    /// resolves above the base directory. Leading separators are ignored.
    Beneath,
}

/// Validated, non-empty list of path components.
///
/// None of the components contain a separator. Only the lone `.` component
/// (referring to the base itself) can be a dot component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathSegments {
    segments: Vec<OsString>,
}

impl PathSegments {
    /// Split into the intermediate directories and the final component.
    pub(crate) fn split_last(&self) -> (&[OsString], &OsStr) {
        match self.segments.split_last() {
            Some((last, dirs)) => (dirs, last),
            // Unreachable in practice, the constructors never build an empty
            // list. Treat it as the base directory.
            None => (&[], OsStr::new(".")),
        }
    }

    /// The segments joined with `/`, relative to the base.
    pub(crate) fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[OsString] {
        &self.segments
    }
}

#[cfg(unix)]
fn is_separator(c: u8) -> bool {
    c == b'/'
}

#[cfg(windows)]
fn is_separator(c: u8) -> bool {
    c == b'/' || c == b'\\'
}

#[cfg(unix)]
fn find_separator(bytes: &[u8]) -> Option<usize> {
    memchr::memchr(b'/', bytes)
}

#[cfg(windows)]
fn find_separator(bytes: &[u8]) -> Option<usize> {
    memchr::memchr2(b'/', b'\\', bytes)
}

/// Characters that can never appear in a Windows filename. `?` shows up in NT
/// object-manager prefixes (`\??\`) and `:` in drive letters and alternate
/// data streams.
#[cfg(windows)]
fn is_illegal(c: u8) -> bool {
    matches!(c, b'?' | b'*' | b':' | b'<' | b'>' | b'|' | b'"' | 0x01..=0x1f)
}

#[cfg(unix)]
fn is_illegal(_c: u8) -> bool {
    false
}

/// Non-empty components of `bytes`, split on every separator.
fn components(bytes: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    bytes.split(|&c| is_separator(c)).filter(|c| !c.is_empty())
}

/// Lexically clean a list of components. `.` is dropped and `..` removes the
/// previous normal component. Leading `..` components are kept.
fn clean<'a>(components: impl Iterator<Item = &'a [u8]>) -> Vec<&'a [u8]> {
    let mut stack: Vec<&[u8]> = Vec::new();
    for part in components {
        match part {
            b"." => {}
            b".." => match stack.last() {
                Some(&last) if last != b".." => {
                    stack.pop();
                }
                _ => stack.push(part),
            },
            _ => stack.push(part),
        }
    }
    stack
}

fn to_segments<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> PathSegments {
    PathSegments {
        segments: parts
            .into_iter()
            .map(|part| utils::os_str_from_bytes(part).to_os_string())
            .collect(),
    }
}

/// Validate `path` for the given [`ResolutionMode`].
pub(crate) fn validate(path: &Path, mode: ResolutionMode) -> Result<PathSegments, Error> {
    let bytes = path.as_os_str().as_os_bytes();

    if bytes.is_empty() {
        InvalidPathSnafu {
            path,
            description: "empty path",
        }
        .fail()?
    }
    if memchr::memchr(b'\0', bytes).is_some() {
        InvalidPathSnafu {
            path,
            description: "path contains a nul byte",
        }
        .fail()?
    }
    if bytes.iter().any(|&c| is_illegal(c)) {
        InvalidPathSnafu {
            path,
            description: "path contains a character not allowed in filenames",
        }
        .fail()?
    }

    match mode {
        ResolutionMode::DirectChild => {
            if find_separator(bytes).is_some() {
                InvalidPathSnafu {
                    path,
                    description: "direct child name contains a path separator",
                }
                .fail()?
            }
            if bytes == b"." || bytes == b".." {
                InvalidPathSnafu {
                    path,
                    description: "direct child name must not be a dot entry",
                }
                .fail()?
            }
            Ok(to_segments([bytes]))
        }
        ResolutionMode::Beneath => {
            let parts: Vec<&[u8]> = components(bytes).collect();
            if parts.is_empty() {
                InvalidPathSnafu {
                    path,
                    description: "path has no components",
                }
                .fail()?
            }
            if !parts.iter().any(|&p| p == b"." || p == b"..") {
                return Ok(to_segments(parts));
            }

            let cleaned = clean(parts.into_iter());
            match cleaned.first() {
                Some(first) if *first == b".." => {
                    log::debug!("rejecting {path:?}: escapes the base directory");
                    Err(TraversalRejectedSnafu { path }.build().into())
                }
                Some(_) => Ok(to_segments(cleaned)),
                None => Ok(to_segments([&b"."[..]])),
            }
        }
    }
}
