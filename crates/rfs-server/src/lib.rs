//! rfs server library.
//!
//! The serving edge of the rfs remote filesystem: the password-backed
//! accounts collaborator, the request envelope and dispatcher, and the
//! line-framed TCP session loop the binary runs.

pub mod auth;
pub mod constants;
pub mod rpc;

pub use auth::PasswordAccounts;
pub use rpc::{dispatch, serve_connection, Request, Response};
