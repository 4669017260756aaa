//! POSIX rwx permission evaluation.
//!
//! A pure function over the file's mode triads and the caller's identity.
//! No I/O, no suspension. The administrator bypasses every check.

use crate::meta::{FileRecord, User};

/// The distinguished administrator uid.
pub const ADMIN_UID: u32 = 5000;

/// Which of the three permission bits an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Exec,
}

impl AccessMode {
    fn mask(self) -> u32 {
        match self {
            AccessMode::Read => 4,
            AccessMode::Write => 2,
            AccessMode::Exec => 1,
        }
    }
}

/// POSIX owner/group/other check with the admin override.
///
/// Exactly one triad applies — owner if the uids match, else group if both
/// sides carry the same gid, else other.
pub fn allowed(file: &FileRecord, mode: AccessMode, user: &User) -> bool {
    if user.uid == ADMIN_UID {
        return true;
    }

    let mask = mode.mask();
    let owner_bits = (file.permissions >> 6) & mask;
    let group_bits = (file.permissions >> 3) & mask;
    let other_bits = file.permissions & mask;

    if user.uid == file.owner_uid && owner_bits == mask {
        return true;
    }
    if let (Some(fg), Some(ug)) = (file.group_gid, user.gid) {
        if fg == ug && group_bits == mask {
            return true;
        }
    }
    other_bits == mask
}
