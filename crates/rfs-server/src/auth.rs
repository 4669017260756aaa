//! Password-backed account provisioning and request authentication.
//!
//! Implements the core's [`Accounts`] collaborator in-process: user rows are
//! created with a fresh random salt and a SHA-256 hash over salt‖token, and
//! the transport verifies logins against the same material. Password policy
//! and recovery flows are deliberately absent.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use rfs_core::{Accounts, FsError, FsResult, MetaStore, User};

pub struct PasswordAccounts {
    meta: Arc<MetaStore>,
}

impl PasswordAccounts {
    pub fn new(meta: Arc<MetaStore>) -> Self {
        Self { meta }
    }

    fn hash(salt: &str, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(token.as_bytes());
        B64.encode(hasher.finalize())
    }

    fn fresh_salt() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        B64.encode(bytes)
    }

    /// Set (or reset) a user's password, creating the row if needed. Used
    /// for administrator bootstrap.
    pub fn set_password(&self, uid: u32, token: &str) -> FsResult<()> {
        self.meta.upsert_user(uid)?;
        let salt = Self::fresh_salt();
        self.meta.set_credentials(uid, &Self::hash(&salt, token), &salt)
    }

    /// Check a login attempt. `None` means unknown user, unset password, or
    /// a wrong one — callers respond 401 either way.
    pub fn verify(&self, uid: u32, password: &str) -> FsResult<Option<User>> {
        let Some(creds) = self.meta.credentials(uid)? else {
            return Ok(None);
        };
        if Self::hash(&creds.salt, password) != creds.password_hash {
            return Ok(None);
        }
        self.meta.user(uid)
    }
}

#[async_trait]
impl Accounts for PasswordAccounts {
    async fn create_user(&self, uid: u32, token: &str) -> FsResult<()> {
        if self.meta.credentials(uid)?.is_some() {
            return Err(FsError::already_exists(format!("user {uid} already exists")));
        }
        self.set_password(uid, token)
    }

    async fn assign_group(&self, uid: u32, gid: u32) -> FsResult<()> {
        if self.meta.user(uid)?.is_none() {
            return Err(FsError::not_found(format!("no user {uid}")));
        }
        self.meta.ensure_group(gid)?;
        self.meta.set_user_group(uid, gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> PasswordAccounts {
        PasswordAccounts::new(Arc::new(MetaStore::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let accounts = accounts();
        accounts.create_user(5001, "s3cret").await.unwrap();

        let user = accounts.verify(5001, "s3cret").unwrap().unwrap();
        assert_eq!(user.uid, 5001);
        assert!(accounts.verify(5001, "wrong").unwrap().is_none());
        assert!(accounts.verify(5002, "s3cret").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_user_conflict() {
        let accounts = accounts();
        accounts.create_user(5001, "a").await.unwrap();
        let err = accounts.create_user(5001, "b").await.unwrap_err();
        assert_eq!(err.identifier(), "EEXIST");
    }

    #[tokio::test]
    async fn test_assign_group() {
        let accounts = accounts();
        accounts.create_user(5001, "a").await.unwrap();
        accounts.assign_group(5001, 6000).await.unwrap();

        let user = accounts.verify(5001, "a").unwrap().unwrap();
        assert_eq!(user.gid, Some(6000));

        let err = accounts.assign_group(5999, 6000).await.unwrap_err();
        assert_eq!(err.identifier(), "ENOENT");
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(PasswordAccounts::fresh_salt(), PasswordAccounts::fresh_salt());
    }
}
