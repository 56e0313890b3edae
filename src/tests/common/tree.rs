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

use std::{fs, os::unix::fs as unixfs, path::Path};

use anyhow::{Context, Error};
use tempfile::TempDir;

macro_rules! create_inode {
    // "/foo/bar" => dir
    ($path:expr => dir) => {
        fs::create_dir($path).with_context(|| format!("mkdir {}", $path.display()))?;
    };
    // "/foo/bar" => file
    ($path:expr => file) => {
        fs::write($path, b"").with_context(|| format!("mkfile {}", $path.display()))?;
    };
    // "/foo/bar" => file "contents"
    ($path:expr => file $contents:literal) => {
        fs::write($path, $contents).with_context(|| format!("mkfile {}", $path.display()))?;
    };
    // "/foo/bar" => symlink -> "target"
    ($path:expr => symlink -> $target:expr) => {
        unixfs::symlink($target, $path)
            .with_context(|| format!("symlink {} -> {}", $path.display(), $target))?;
    };
}

macro_rules! create_tree {
    // create_tree! {
    //     "a" => (dir);
    //     "a/b/c" => (file "contents");
    //     "b-link" => (symlink -> "a/b");
    // }
    ($($subpath:expr => ($($inner:tt)*));+ $(;)*) => {
        {
            let root = TempDir::new()?;
            $(
                {
                    let root_dir: &Path = root.as_ref();
                    let subpath = $subpath;
                    let path = root_dir.join(subpath.trim_start_matches('/'));
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).with_context(|| format!("mkdirall {}", path.display()))?;
                    }
                    create_inode!(&path => $($inner)*);
                }
            )*
            root
        }
    }
}

pub(in crate::tests) fn create_basic_tree() -> Result<TempDir, Error> {
    Ok(create_tree! {
        // Plain files and directories.
        "x" => (file "base-x");
        "b" => (file "top-b");
        "subdir/x" => (file "subdir-x");
        "subdir/empty" => (file);
        "a/b/c/file" => (file "deep");
        "emptydir" => (dir);
        // Symlinks that stay inside the base.
        "link-file" => (symlink -> "x");
        "link-dir" => (symlink -> "subdir");
        "subdir/link-up" => (symlink -> "../x");
        "a/b/link-c" => (symlink -> "c");
        // Symlinks that escape the base.
        "link-root" => (symlink -> "/");
        "a/b/link-abs" => (symlink -> "/etc");
        "subdir/link-escape" => (symlink -> "../../../../../../../../etc/passwd");
        // Dangling symlinks.
        "dangling" => (symlink -> "nonexistent");
        "subdir/dangling-dir" => (symlink -> "nonexistent/dir");
    })
}

/// The tree from the worked examples: `sub/link` escapes, `sub/sub2/data.txt`
/// is an ordinary nested file and `b` is a top-level file.
pub(in crate::tests) fn create_scenario_tree() -> Result<TempDir, Error> {
    Ok(create_tree! {
        "sub/link" => (symlink -> "../../etc/passwd");
        "sub/sub2/data.txt" => (file "hello");
        "b" => (file "contents of b");
    })
}
