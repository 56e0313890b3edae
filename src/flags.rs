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

#[cfg(unix)]
const ACCMODE: i32 = libc::O_ACCMODE;
#[cfg(windows)]
const ACCMODE: i32 = 0x3;

#[cfg(unix)]
bitflags! {
    /// Portable `O_*` open flags.
    ///
    /// On unix the flag values are the underlying `libc`'s, and their meaning
    /// is identical to the description in the `open(2)` man page. Unknown bits
    /// are passed through to the kernel untouched.
    ///
    /// # Caveats
    ///
    /// For historical reasons, the first three bits of `open(2)`'s flags are
    /// for the access mode and are actually treated as a 2-bit number. So, it
    /// is incorrect to attempt to do any checks on the access mode without
    /// masking it correctly. So some helpers were added to make usage more
    /// ergonomic.
    ///
    /// ```
    /// # use safeopen::OpenFlags;
    /// // Using .contains() can lead to confusing behaviour:
    /// # let ret =
    /// OpenFlags::O_WRONLY.contains(OpenFlags::O_RDONLY); // returns true!
    /// # assert!(ret);
    /// # let ret =
    /// OpenFlags::O_RDWR.contains(OpenFlags::O_WRONLY); // returns false!
    /// # assert!(!ret);
    /// // But using the .wants_write() and .wants_read() helpers works:
    /// assert_eq!(OpenFlags::O_WRONLY.wants_read(), false);
    /// # #[allow(clippy::bool_assert_comparison)]
    /// assert_eq!(OpenFlags::O_RDONLY.wants_read(), true);
    /// # #[allow(clippy::bool_assert_comparison)]
    /// assert_eq!(OpenFlags::O_RDWR.wants_write(), true);
    /// // As well as the sneaky "implied write" cases.
    /// assert_eq!((OpenFlags::O_CREAT|OpenFlags::O_RDONLY).wants_write(), true);
    /// assert_eq!((OpenFlags::O_TRUNC|OpenFlags::O_RDONLY).wants_write(), true);
    /// ```
    #[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct OpenFlags: i32 {
        // Access modes (including O_PATH).
        const O_RDWR = libc::O_RDWR;
        const O_RDONLY = libc::O_RDONLY;
        const O_WRONLY = libc::O_WRONLY;
        #[cfg(target_os = "linux")]
        const O_PATH = libc::O_PATH;

        // Fd flags.
        const O_CLOEXEC = libc::O_CLOEXEC;

        // Control lookups.
        const O_NOFOLLOW = libc::O_NOFOLLOW;
        const O_DIRECTORY = libc::O_DIRECTORY;
        const O_NOCTTY = libc::O_NOCTTY;

        // File creation.
        const O_CREAT = libc::O_CREAT;
        const O_EXCL = libc::O_EXCL;
        const O_TRUNC = libc::O_TRUNC;
        const O_APPEND = libc::O_APPEND;

        // Sync.
        const O_SYNC = libc::O_SYNC;
        const O_DSYNC = libc::O_DSYNC;
        const O_NONBLOCK = libc::O_NONBLOCK;

        // Don't clobber unknown O_* bits.
        const _ = !0;
    }
}

#[cfg(windows)]
bitflags! {
    /// Portable `O_*` open flags.
    ///
    /// Windows has no native `O_*` namespace, so these are crate-defined bits
    /// with the usual unix meaning. They are translated into `NtCreateFile`
    /// access masks and create dispositions when opening.
    #[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct OpenFlags: i32 {
        // Access modes.
        const O_RDONLY = 0x0;
        const O_WRONLY = 0x1;
        const O_RDWR = 0x2;

        // File creation.
        const O_CREAT = 0x40;
        const O_EXCL = 0x80;
        const O_TRUNC = 0x200;
        const O_APPEND = 0x400;

        const _ = !0;
    }
}

impl OpenFlags {
    /// Grab the access mode bits from the flags.
    ///
    /// If the flags contain `O_PATH`, this returns `None`.
    #[inline]
    pub fn access_mode(self) -> Option<i32> {
        if self.is_opath() {
            None
        } else {
            Some(self.bits() & ACCMODE)
        }
    }

    /// Does the access mode imply read access?
    ///
    /// Returns false for `O_PATH`.
    #[inline]
    pub fn wants_read(self) -> bool {
        match self.access_mode() {
            None => false, // O_PATH
            Some(acc) => acc == Self::O_RDONLY.bits() || acc == Self::O_RDWR.bits(),
        }
    }

    /// Does the access mode imply write access? Note that there are several
    /// other bits in OpenFlags that imply write access other than `O_WRONLY`
    /// and `O_RDWR`. This function checks those bits as well.
    ///
    /// Returns false for `O_PATH`.
    #[inline]
    pub fn wants_write(self) -> bool {
        match self.access_mode() {
            None => false, // O_PATH
            Some(acc) => {
                acc == Self::O_WRONLY.bits()
                    || acc == Self::O_RDWR.bits()
                    || !self
                        // O_CREAT and O_TRUNC are silently ignored with O_PATH.
                        .intersection(OpenFlags::O_TRUNC | OpenFlags::O_CREAT)
                        .is_empty()
            }
        }
    }

    #[cfg(target_os = "linux")]
    #[inline]
    fn is_opath(self) -> bool {
        self.contains(OpenFlags::O_PATH)
    }

    #[cfg(not(target_os = "linux"))]
    #[inline]
    fn is_opath(self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::flags::OpenFlags;

    use pretty_assertions::assert_eq;

    macro_rules! openflags_tests {
        ($($(#[$meta:meta])* $test_name:ident ( $($flag:ident)|+ ) == {accmode: $accmode:expr, read: $wants_read:expr, write: $wants_write:expr} );+ $(;)?) => {
            $(
                paste::paste! {
                    $(#[$meta])*
                    #[test]
                    fn [<openflags_ $test_name _access_mode>]() {
                        let flags = $(OpenFlags::$flag)|*;
                        let accmode: Option<OpenFlags> = $accmode;
                        assert_eq!(flags.access_mode(), accmode.map(|f| f.bits()), "{:?} access mode should be {:?}", flags, accmode);
                    }

                    $(#[$meta])*
                    #[test]
                    fn [<openflags_ $test_name _wants_read>]() {
                        let flags = $(OpenFlags::$flag)|*;
                        assert_eq!(flags.wants_read(), $wants_read, "{:?} wants_read should be {:?}", flags, $wants_read);
                    }

                    $(#[$meta])*
                    #[test]
                    fn [<openflags_ $test_name _wants_write>]() {
                        let flags = $(OpenFlags::$flag)|*;
                        assert_eq!(flags.wants_write(), $wants_write, "{:?} wants_write should be {:?}", flags, $wants_write);
                    }
                }
            )*
        }
    }

    openflags_tests! {
        plain_rdonly(O_RDONLY) == {accmode: Some(OpenFlags::O_RDONLY), read: true, write: false};
        plain_wronly(O_WRONLY) == {accmode: Some(OpenFlags::O_WRONLY), read: false, write: true};
        plain_rdwr(O_RDWR) == {accmode: Some(OpenFlags::O_RDWR), read: true, write: true};

        trunc_rdonly(O_RDONLY|O_TRUNC) == {accmode: Some(OpenFlags::O_RDONLY), read: true, write: true};
        trunc_wronly(O_WRONLY|O_TRUNC) == {accmode: Some(OpenFlags::O_WRONLY), read: false, write: true};
        trunc_rdwr(O_RDWR|O_TRUNC) == {accmode: Some(OpenFlags::O_RDWR), read: true, write: true};

        creat_rdonly(O_RDONLY|O_CREAT) == {accmode: Some(OpenFlags::O_RDONLY), read: true, write: true};
        creat_wronly(O_WRONLY|O_CREAT) == {accmode: Some(OpenFlags::O_WRONLY), read: false, write: true};
        creat_rdwr(O_RDWR|O_CREAT) == {accmode: Some(OpenFlags::O_RDWR), read: true, write: true};
        append_wronly(O_WRONLY|O_APPEND) == {accmode: Some(OpenFlags::O_WRONLY), read: false, write: true};

        #[cfg(target_os = "linux")]
        plain_opath(O_PATH) == {accmode: None, read: false, write: false};
        #[cfg(target_os = "linux")]
        rdwr_opath(O_RDWR|O_PATH) == {accmode: None, read: false, write: false};
        #[cfg(target_os = "linux")]
        creat_path(O_PATH|O_CREAT) == {accmode: None, read: false, write: false};
    }
}
