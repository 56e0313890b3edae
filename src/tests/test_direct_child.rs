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

use crate::{error::ErrorKind, flags::OpenFlags, tests::common as tests_common};

use std::{
    fs,
    io::{Read, Seek, SeekFrom, Write},
};

use pretty_assertions::assert_eq;

macro_rules! direct_child_tests {
    // direct_child_tests! {
    //     test_ok: open_direct_child("name") => Ok(Some("contents"));
    //     test_err: create_direct_child("a/b") => Err(ErrorKind::...);
    // }
    ($($test_name:ident : $op:ident ($name:expr) => $expected:expr);+ $(;)?) => {
        $(
            paste::paste! {
                resolver_tests! {
                    fn [<$op _ $test_name>](resolver) {
                        let root = tests_common::create_basic_tree()?;
                        let expected: Result<Option<&str>, ErrorKind> = $expected;
                        let result = resolver.$op(root.path(), $name);
                        tests_common::check_open(result, expected)?;
                        Ok(())
                    }
                }
            }
        )+
    };
}

direct_child_tests! {
    plain: open_direct_child("x") => Ok(Some("base-x"));
    empty_file: open_direct_child("b") => Ok(Some("top-b"));
    directory: open_direct_child("subdir") => Ok(None);
    nonexistent: open_direct_child("nonexistent") => Err(ErrorKind::NotFound);
    empty: open_direct_child("") => Err(ErrorKind::InvalidPath);
    nested: open_direct_child("subdir/x") => Err(ErrorKind::InvalidPath);
    leading_slash: open_direct_child("/x") => Err(ErrorKind::InvalidPath);
    trailing_slash: open_direct_child("subdir/") => Err(ErrorKind::InvalidPath);
    dot: open_direct_child(".") => Err(ErrorKind::InvalidPath);
    dotdot: open_direct_child("..") => Err(ErrorKind::InvalidPath);
    inner_dotdot: open_direct_child("subdir/../x") => Err(ErrorKind::InvalidPath);
    nul: open_direct_child("x\0") => Err(ErrorKind::InvalidPath);
    symlink_file: open_direct_child("link-file") => Err(ErrorKind::SymlinkRejected);
    symlink_dir: open_direct_child("link-dir") => Err(ErrorKind::SymlinkRejected);
    symlink_root: open_direct_child("link-root") => Err(ErrorKind::SymlinkRejected);
    symlink_dangling: open_direct_child("dangling") => Err(ErrorKind::SymlinkRejected);

    new_file: create_direct_child("new-file") => Ok(None);
    existing_file: create_direct_child("x") => Ok(None);
    nested: create_direct_child("subdir/new-file") => Err(ErrorKind::InvalidPath);
    dotdot: create_direct_child("../new-file") => Err(ErrorKind::InvalidPath);
    directory: create_direct_child("subdir") => Err(ErrorKind::OsError(Some(libc::EISDIR)));
    symlink_file: create_direct_child("link-file") => Err(ErrorKind::SymlinkRejected);
    symlink_dangling: create_direct_child("dangling") => Err(ErrorKind::SymlinkRejected);
}

resolver_tests! {
    fn create_then_open_roundtrip(resolver) {
        let root = tests_common::create_basic_tree()?;
        let data = b"some data that crosses the round trip\n";

        let mut handle = resolver.create_direct_child(root.path(), "roundtrip")?;
        handle.write_all(data)?;
        drop(handle);

        let mut got = Vec::new();
        resolver
            .open_direct_child(root.path(), "roundtrip")?
            .read_to_end(&mut got)?;
        assert_eq!(got, data, "contents read back should match what was written");
        Ok(())
    }

    fn create_truncates(resolver) {
        let root = tests_common::create_basic_tree()?;

        let mut handle = resolver.create_direct_child(root.path(), "x")?;
        let mut got = String::new();
        handle.read_to_string(&mut got)?;
        assert_eq!(got, "", "create_direct_child should truncate existing files");

        handle.write_all(b"replaced")?;
        handle.seek(SeekFrom::Start(0))?;
        handle.read_to_string(&mut got)?;
        assert_eq!(got, "replaced");
        Ok(())
    }

    fn create_does_not_touch_symlink_target(resolver) {
        let root = tests_common::create_basic_tree()?;

        let err = resolver
            .create_direct_child(root.path(), "link-file")
            .expect_err("creating through a symlink must fail");
        assert_eq!(err.kind(), ErrorKind::SymlinkRejected);
        assert_eq!(
            fs::read_to_string(root.path().join("x"))?,
            "base-x",
            "symlink target must be left alone"
        );
        Ok(())
    }

    fn open_file_exclusive(resolver) {
        let root = tests_common::create_basic_tree()?;
        let flags = OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_EXCL;

        resolver.open_file_direct_child(root.path(), "exclusive", flags, 0o600)?;
        let err = resolver
            .open_file_direct_child(root.path(), "exclusive", flags, 0o600)
            .expect_err("O_EXCL on an existing file must fail");
        assert_eq!(err.kind(), ErrorKind::OsError(Some(libc::EEXIST)));
        Ok(())
    }

    fn open_file_append(resolver) {
        let root = tests_common::create_basic_tree()?;
        let flags = OpenFlags::O_WRONLY | OpenFlags::O_APPEND;

        let mut handle = resolver.open_file_direct_child(root.path(), "x", flags, 0)?;
        handle.write_all(b"+more")?;
        drop(handle);
        assert_eq!(fs::read_to_string(root.path().join("x"))?, "base-x+more");
        Ok(())
    }

    fn whole_file_helpers(resolver) {
        let root = tests_common::create_basic_tree()?;

        resolver.write_direct_child(root.path(), "written", "first", 0o644)?;
        resolver.write_direct_child(root.path(), "written", "second", 0o644)?;
        assert_eq!(
            resolver.read_direct_child(root.path(), "written")?,
            b"second",
            "write_direct_child should replace existing contents"
        );

        let err = resolver
            .write_direct_child(root.path(), "link-file", "evil", 0o644)
            .expect_err("writing through a symlink must fail");
        assert_eq!(err.kind(), ErrorKind::SymlinkRejected);
        Ok(())
    }

    fn handle_metadata(resolver) {
        let root = tests_common::create_basic_tree()?;

        let handle = resolver.open_direct_child(root.path(), "x")?;
        assert_eq!(handle.flags(), OpenFlags::O_RDONLY);
        assert_eq!(handle.path(), root.path().join("x"));
        assert!(handle.metadata()?.is_file(), "x should be a regular file");

        let mut clone = handle.try_clone()?;
        let mut got = String::new();
        clone.read_to_string(&mut got)?;
        assert_eq!(got, "base-x");
        Ok(())
    }

    fn trailing_slash_base(resolver) {
        let root = tests_common::create_basic_tree()?;
        let base = format!("{}/", root.path().display());

        let mut got = String::new();
        resolver.open_direct_child(&base, "x")?.read_to_string(&mut got)?;
        assert_eq!(got, "base-x");
        Ok(())
    }

    fn base_is_not_a_directory(resolver) {
        let root = tests_common::create_basic_tree()?;

        let err = resolver
            .open_direct_child(root.path().join("x"), "anything")
            .expect_err("base must be a directory");
        assert_eq!(err.kind(), ErrorKind::OsError(Some(libc::ENOTDIR)));
        Ok(())
    }
}

#[test]
fn free_functions() -> Result<(), anyhow::Error> {
    let root = tests_common::create_basic_tree()?;

    crate::write_direct_child(root.path(), "free", b"via free functions", 0o644)?;
    assert_eq!(
        crate::read_direct_child(root.path(), "free")?,
        b"via free functions"
    );

    let mut handle = crate::create_direct_child(root.path(), "free")?;
    handle.write_all(b"recreated")?;
    drop(handle);

    let mut got = String::new();
    crate::open_direct_child(root.path(), "free")?.read_to_string(&mut got)?;
    assert_eq!(got, "recreated");

    let err = crate::open_direct_child(root.path(), "subdir/x")
        .expect_err("separators are not allowed");
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn write_reports_device_errors() -> Result<(), anyhow::Error> {
    if !std::path::Path::new("/dev/full").exists() {
        eprintln!("SKIPPING write_reports_device_errors: no /dev/full");
        return Ok(());
    }

    let err = crate::write_direct_child("/dev", "full", b"no space left", 0o644)
        .expect_err("writing to /dev/full must fail");
    assert_eq!(err.kind(), ErrorKind::OsError(Some(libc::ENOSPC)));
    assert!(
        err.to_string().contains("/dev/full"),
        "error should name the file: {err}"
    );

    // Devices are written but never synced.
    crate::write_direct_child("/dev", "null", b"discarded", 0o644)?;
    Ok(())
}
