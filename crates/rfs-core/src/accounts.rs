//! Account provisioning side channel.
//!
//! Two reserved regular files exist at the root; a completed write to either
//! hands its content to the accounts collaborator, in-process, and the file
//! is then overwritten with a one-line outcome message:
//!
//! - `/create-user.txt`: `"<uid> <token>"` — register a user.
//! - `/create-group.txt`: `"<uid> <gid>"` — put a user into a group.
//!
//! This is the only point where the core talks to authentication at request
//! time.

use async_trait::async_trait;

use crate::error::FsResult;

/// Reserved path that provisions users.
pub const CREATE_USER_PATH: &str = "/create-user.txt";

/// Reserved path that assigns group membership.
pub const CREATE_GROUP_PATH: &str = "/create-group.txt";

pub fn is_reserved(path: &str) -> bool {
    path == CREATE_USER_PATH || path == CREATE_GROUP_PATH
}

/// The accounts collaborator. The serving edge provides the implementation;
/// the core only posts tuples parsed out of the reserved files.
#[async_trait]
pub trait Accounts: Send + Sync {
    /// Register `uid` with the given opaque password token.
    async fn create_user(&self, uid: u32, token: &str) -> FsResult<()>;

    /// Put `uid` into `gid`, creating the group if needed.
    async fn assign_group(&self, uid: u32, gid: u32) -> FsResult<()>;
}

/// A parsed reserved-file directive: the uid and the second token.
pub fn parse_directive(content: &str) -> Option<(u32, &str)> {
    let mut words = content.split_whitespace();
    let uid = words.next()?.parse().ok()?;
    let rest = words.next()?;
    if words.next().is_some() {
        return None;
    }
    Some((uid, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directive() {
        assert_eq!(parse_directive("5001 s3cret"), Some((5001, "s3cret")));
        assert_eq!(parse_directive("  5001\t6000\n"), Some((5001, "6000")));
        assert_eq!(parse_directive("5001"), None);
        assert_eq!(parse_directive("abc def"), None);
        assert_eq!(parse_directive("5001 a b"), None);
        assert_eq!(parse_directive(""), None);
    }

    #[test]
    fn test_reserved_paths() {
        assert!(is_reserved("/create-user.txt"));
        assert!(is_reserved("/create-group.txt"));
        assert!(!is_reserved("/docs/create-user.txt"));
    }
}
