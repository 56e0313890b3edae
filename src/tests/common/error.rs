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

use crate::{error::ErrorKind, Handle};

use std::{fmt::Debug, io::Read};

use anyhow::Error;
use pretty_assertions::assert_eq;

pub(in crate::tests) fn check_err<T1, T2>(
    result: &Result<T1, crate::error::Error>,
    expected: &Result<T2, ErrorKind>,
) -> Result<(), Error>
where
    T1: Debug,
    T2: Debug,
{
    let result = result.as_ref();
    let expected = expected.as_ref();

    match (result, expected) {
        (Err(error), Err(expected_kind)) => {
            let kind = error.kind();
            if kind != *expected_kind {
                anyhow::bail!(
                    "expected error {expected_kind:?} but got {error:?} (kind: {kind:?})"
                );
            }
        }
        (Ok(_), Ok(_)) => (),
        (result, expected) => anyhow::bail!("expected {expected:?} but got {result:?}"),
    }
    Ok(())
}

/// Check the result of an open, and if `expected` carries contents also check
/// that reading the handle yields exactly those.
pub(in crate::tests) fn check_open(
    result: Result<Handle, crate::error::Error>,
    expected: Result<Option<&str>, ErrorKind>,
) -> Result<(), Error> {
    check_err(&result, &expected)?;

    if let (Ok(mut handle), Ok(Some(contents))) = (result, expected) {
        let mut got = String::new();
        handle.read_to_string(&mut got)?;
        assert_eq!(got, contents, "unexpected contents of {:?}", handle.path());
    }
    Ok(())
}
