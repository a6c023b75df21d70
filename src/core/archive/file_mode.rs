// ─── POSIX mode bits ───

use std::fmt;
use std::path::Path;

use crate::core::error::{ProvisionError, ProvisionResult};

/// Read/write/execute triplet for one subject class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Access {
    fn from_bits(bits: u32) -> Self {
        Self {
            read: bits & 0o4 != 0,
            write: bits & 0o2 != 0,
            execute: bits & 0o1 != 0,
        }
    }

    fn bits(self) -> u32 {
        (self.read as u32) << 2 | (self.write as u32) << 1 | self.execute as u32
    }
}

/// Decoded 16-bit mode field of a tar entry.
///
/// Only the permission part (`0o7777`) is kept; file type bits above it are
/// ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMode {
    pub set_uid: bool,
    pub set_gid: bool,
    pub sticky: bool,
    pub user: Access,
    pub group: Access,
    pub other: Access,
}

impl FileMode {
    pub fn from_mode(mode: u32) -> ProvisionResult<Self> {
        if mode > 0xFFFF {
            return Err(ProvisionError::InvalidFileMode(mode));
        }
        Ok(Self {
            set_uid: mode & 0o4000 != 0,
            set_gid: mode & 0o2000 != 0,
            sticky: mode & 0o1000 != 0,
            user: Access::from_bits(mode >> 6),
            group: Access::from_bits(mode >> 3),
            other: Access::from_bits(mode),
        })
    }

    /// Permission bits including setuid/setgid/sticky, e.g. `0o4755`.
    pub fn bits(&self) -> u32 {
        let special =
            (self.set_uid as u32) << 2 | (self.set_gid as u32) << 1 | self.sticky as u32;
        special << 9 | self.user.bits() << 6 | self.group.bits() << 3 | self.other.bits()
    }

    pub fn readable(&self) -> bool {
        self.user.read || self.group.read || self.other.read
    }

    pub fn writable(&self) -> bool {
        self.user.write || self.group.write || self.other.write
    }

    pub fn executable(&self) -> bool {
        self.user.execute || self.group.execute || self.other.execute
    }

    /// Apply the mode to an extracted file.
    #[cfg(unix)]
    pub fn apply(&self, path: &Path) -> ProvisionResult<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.bits())).map_err(
            |source| ProvisionError::Io {
                path: path.to_path_buf(),
                source,
            },
        )
    }

    /// Best effort: only the read-only flag can be expressed off Unix.
    #[cfg(not(unix))]
    pub fn apply(&self, path: &Path) -> ProvisionResult<()> {
        let io_err = |source| ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut permissions = std::fs::metadata(path).map_err(io_err)?.permissions();
        permissions.set_readonly(!self.writable());
        std::fs::set_permissions(path, permissions).map_err(io_err)
    }
}

impl fmt::Display for FileMode {
    /// `ls -l` style, e.g. `rwsr-xr-t`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let triplet = |access: Access, special: bool, special_char: char| {
            let exec = match (access.execute, special) {
                (true, true) => special_char,
                (false, true) => special_char.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            };
            format!(
                "{}{}{}",
                if access.read { 'r' } else { '-' },
                if access.write { 'w' } else { '-' },
                exec
            )
        };
        write!(
            f,
            "{}{}{}",
            triplet(self.user, self.set_uid, 's'),
            triplet(self.group, self.set_gid, 's'),
            triplet(self.other, self.sticky, 't')
        )
    }
}
