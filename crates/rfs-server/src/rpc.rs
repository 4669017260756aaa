//! Request envelope, dispatcher, and the line-framed TCP session.
//!
//! One JSON object per line in each direction. The envelope mirrors the HTTP
//! surface one-to-one; an HTTP collaborator terminates HTTP itself, builds
//! the same [`Request`] values, and maps failures with the `status` field of
//! [`Response::Error`]. Sessions authenticate with `login` before anything
//! else; file bytes travel base64-encoded, bulk transfers as `chunk` frame
//! sequences.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

use rfs_core::config::MAX_WRITE_BODY;
use rfs_core::{FsError, Filesystem, GetAttrOutcome, User};
use rfs_types::{
    codec, DiskUsage, FileEntry, HardlinkRequest, ReadlinkReply, RenameRequest, SetAttrRequest,
    SymlinkRequest, WriteReply,
};

use crate::auth::PasswordAccounts;
use crate::constants::MAX_FRAME_LENGTH;

// ============================================================================
// Envelope
// ============================================================================

/// One request frame. Inode fields are decimal strings, like everywhere else
/// on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Login {
        uid: u32,
        password: String,
    },
    Readdir {
        #[serde(with = "codec::u64_string")]
        ino: u64,
    },
    Lookup {
        #[serde(with = "codec::u64_string")]
        parent_ino: u64,
        name: String,
    },
    Mkdir {
        #[serde(with = "codec::u64_string")]
        parent_ino: u64,
        name: String,
    },
    Rmdir {
        #[serde(with = "codec::u64_string")]
        parent_ino: u64,
        name: String,
    },
    CreateFile {
        #[serde(with = "codec::u64_string")]
        parent_ino: u64,
        name: String,
    },
    Unlink {
        #[serde(with = "codec::u64_string")]
        parent_ino: u64,
        name: String,
    },
    Rename {
        #[serde(with = "codec::u64_string")]
        old_parent_ino: u64,
        old_name: String,
        body: RenameRequest,
    },
    GetAttr {
        #[serde(with = "codec::u64_string")]
        ino: u64,
        /// Client's last-known mtime, ms since epoch.
        if_modified_since: Option<i64>,
    },
    SetAttr {
        #[serde(with = "codec::u64_string")]
        ino: u64,
        body: SetAttrRequest,
    },
    Read {
        #[serde(with = "codec::u64_string")]
        ino: u64,
        offset: u64,
        size: u64,
    },
    Write {
        #[serde(with = "codec::u64_string")]
        ino: u64,
        offset: u64,
        /// base64
        data: String,
    },
    ReadStream {
        #[serde(with = "codec::u64_string")]
        ino: u64,
    },
    /// Opens a chunked upload; `chunk` frames follow, closed by `stream_end`.
    WriteStream {
        #[serde(with = "codec::u64_string")]
        ino: u64,
        offset: u64,
    },
    Chunk {
        /// base64
        data: String,
    },
    StreamEnd,
    Hardlink {
        #[serde(with = "codec::u64_string")]
        target_ino: u64,
        body: HardlinkRequest,
    },
    Symlink {
        body: SymlinkRequest,
    },
    Readlink {
        #[serde(with = "codec::u64_string")]
        ino: u64,
    },
    DiskUsage,
}

/// One response frame.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    LoggedIn {
        uid: u32,
    },
    Entry {
        entry: FileEntry,
    },
    Entries {
        entries: Vec<FileEntry>,
    },
    NotModified,
    Data {
        /// base64
        data: String,
        bytes_read: u64,
    },
    Written(WriteReply),
    Chunk {
        /// base64
        data: String,
    },
    StreamEnd,
    Target(ReadlinkReply),
    Usage(DiskUsage),
    Error {
        error: String,
        status: u16,
        details: String,
    },
}

impl Response {
    pub fn failure(e: &FsError) -> Self {
        Response::Error {
            error: e.identifier().to_string(),
            status: e.http_status(),
            details: e.to_string(),
        }
    }

    pub fn unauthenticated() -> Self {
        Response::Error {
            error: "unauthenticated".to_string(),
            status: 401,
            details: "login required".to_string(),
        }
    }

    fn bad_frame(details: impl Into<String>) -> Self {
        Response::Error {
            error: "EINVAL".to_string(),
            status: 400,
            details: details.into(),
        }
    }
}

fn entry_or_failure(result: Result<FileEntry, FsError>) -> Response {
    match result {
        Ok(entry) => Response::Entry { entry },
        Err(e) => Response::failure(&e),
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Map an authenticated, non-streaming request onto the core.
pub async fn dispatch(fs: &Filesystem, user: &User, request: Request) -> Response {
    match request {
        Request::Readdir { ino } => match fs.readdir(user, ino).await {
            Ok(entries) => Response::Entries { entries },
            Err(e) => Response::failure(&e),
        },
        Request::Lookup { parent_ino, name } => {
            entry_or_failure(fs.lookup(user, parent_ino, &name).await)
        }
        Request::Mkdir { parent_ino, name } => {
            entry_or_failure(fs.mkdir(user, parent_ino, &name).await)
        }
        Request::Rmdir { parent_ino, name } => match fs.rmdir(user, parent_ino, &name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::failure(&e),
        },
        Request::CreateFile { parent_ino, name } => {
            entry_or_failure(fs.create(user, parent_ino, &name).await)
        }
        Request::Unlink { parent_ino, name } => match fs.unlink(user, parent_ino, &name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::failure(&e),
        },
        Request::Rename {
            old_parent_ino,
            old_name,
            body,
        } => entry_or_failure(
            fs.rename(
                user,
                old_parent_ino,
                &old_name,
                body.new_parent_ino,
                &body.new_name,
            )
            .await,
        ),
        Request::GetAttr {
            ino,
            if_modified_since,
        } => match fs.getattr(user, ino, if_modified_since).await {
            Ok(GetAttrOutcome::Entry(entry)) => Response::Entry { entry },
            Ok(GetAttrOutcome::NotModified) => Response::NotModified,
            Err(e) => Response::failure(&e),
        },
        Request::SetAttr { ino, body } => entry_or_failure(fs.setattr(user, ino, &body).await),
        Request::Read { ino, offset, size } => match fs.read(user, ino, offset, size).await {
            Ok(data) => Response::Data {
                bytes_read: data.len() as u64,
                data: B64.encode(data),
            },
            Err(e) => Response::failure(&e),
        },
        Request::Write { ino, offset, data } => {
            let data = match B64.decode(data) {
                Ok(data) => data,
                Err(_) => return Response::bad_frame("data is not valid base64"),
            };
            if data.len() as u64 > MAX_WRITE_BODY {
                return Response::failure(&FsError::invalid("write body over limit"));
            }
            match fs.write(user, ino, offset, &data).await {
                Ok(bytes) => Response::Written(WriteReply { bytes }),
                Err(e) => Response::failure(&e),
            }
        }
        Request::Hardlink { target_ino, body } => entry_or_failure(
            fs.hardlink(user, target_ino, body.link_parent_ino, &body.link_name)
                .await,
        ),
        Request::Symlink { body } => entry_or_failure(
            fs.symlink(user, &body.target_path, body.link_parent_ino, &body.link_name)
                .await,
        ),
        Request::Readlink { ino } => match fs.readlink(ino).await {
            Ok(target) => Response::Target(ReadlinkReply { target }),
            Err(e) => Response::failure(&e),
        },
        Request::DiskUsage => match fs.disk_usage() {
            Ok(usage) => Response::Usage(usage),
            Err(e) => Response::failure(&e),
        },
        // Session- and stream-control frames never reach the dispatcher.
        Request::Login { .. } | Request::ReadStream { .. } | Request::WriteStream { .. } => {
            Response::bad_frame("frame not valid here")
        }
        Request::Chunk { .. } | Request::StreamEnd => {
            Response::bad_frame("no upload in progress")
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Serve one TCP connection until the peer hangs up.
pub async fn serve_connection(
    fs: Arc<Filesystem>,
    auth: Arc<PasswordAccounts>,
    stream: TcpStream,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));
    let mut user: Option<User> = None;

    while let Some(line) = framed.next().await {
        let line = line?;
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                send(&mut framed, &Response::bad_frame(format!("bad frame: {e}"))).await?;
                continue;
            }
        };

        match request {
            Request::Login { uid, password } => match auth.verify(uid, &password) {
                Ok(Some(authenticated)) => {
                    tracing::debug!(uid, "login");
                    user = Some(authenticated);
                    send(&mut framed, &Response::LoggedIn { uid }).await?;
                }
                Ok(None) => send(&mut framed, &Response::unauthenticated()).await?,
                Err(e) => send(&mut framed, &Response::failure(&e)).await?,
            },

            Request::ReadStream { ino } => {
                let Some(user) = user.as_ref() else {
                    send(&mut framed, &Response::unauthenticated()).await?;
                    continue;
                };
                match fs.read_stream(user, ino).await {
                    Ok(mut chunks) => {
                        while let Some(chunk) = chunks.recv().await {
                            match chunk {
                                Ok(bytes) => {
                                    send(
                                        &mut framed,
                                        &Response::Chunk {
                                            data: B64.encode(&bytes),
                                        },
                                    )
                                    .await?;
                                }
                                // Mid-stream failure: chunks already went
                                // out, so drop the connection with no
                                // further response.
                                Err(e) => {
                                    tracing::warn!(ino, error = %e, "read stream aborted");
                                    return Ok(());
                                }
                            }
                        }
                        send(&mut framed, &Response::StreamEnd).await?;
                    }
                    Err(e) => send(&mut framed, &Response::failure(&e)).await?,
                }
            }

            Request::WriteStream { ino, offset } => {
                let Some(session_user) = user.clone() else {
                    send(&mut framed, &Response::unauthenticated()).await?;
                    continue;
                };
                let response =
                    run_upload(&fs, session_user, ino, offset, &mut framed).await?;
                send(&mut framed, &response).await?;
            }

            other => {
                let Some(user) = user.as_ref() else {
                    send(&mut framed, &Response::unauthenticated()).await?;
                    continue;
                };
                let response = dispatch(&fs, user, other).await;
                send(&mut framed, &response).await?;
            }
        }
    }

    Ok(())
}

/// Drain `chunk` frames into the core's streaming write until `stream_end`.
async fn run_upload(
    fs: &Arc<Filesystem>,
    user: User,
    ino: u64,
    offset: u64,
    framed: &mut Framed<TcpStream, LinesCodec>,
) -> anyhow::Result<Response> {
    let (tx, rx) = mpsc::channel::<Bytes>(4);
    let writer = {
        let fs = fs.clone();
        tokio::spawn(async move { fs.write_stream(&user, ino, offset, rx).await })
    };

    let mut total: u64 = 0;
    let mut failure: Option<Response> = None;

    while let Some(line) = framed.next().await {
        let frame: Request = match serde_json::from_str(&line?) {
            Ok(frame) => frame,
            Err(e) => {
                failure = Some(Response::bad_frame(format!("bad frame: {e}")));
                break;
            }
        };
        match frame {
            Request::Chunk { data } => {
                let Ok(bytes) = B64.decode(data) else {
                    failure = Some(Response::bad_frame("chunk is not valid base64"));
                    break;
                };
                total += bytes.len() as u64;
                if total > MAX_WRITE_BODY {
                    failure = Some(Response::failure(&FsError::invalid(
                        "write body over limit",
                    )));
                    break;
                }
                if tx.send(Bytes::from(bytes)).await.is_err() {
                    // Writer bailed early; its error is the response.
                    break;
                }
            }
            Request::StreamEnd => break,
            _ => {
                failure = Some(Response::bad_frame("expected chunk or stream_end"));
                break;
            }
        }
    }

    drop(tx);
    let outcome = writer.await;

    if let Some(failure) = failure {
        return Ok(failure);
    }
    Ok(match outcome {
        Ok(Ok(bytes)) => Response::Written(WriteReply { bytes }),
        Ok(Err(e)) => Response::failure(&e),
        Err(e) => Response::failure(&FsError::io(format!("upload task failed: {e}"))),
    })
}

async fn send(
    framed: &mut Framed<TcpStream, LinesCodec>,
    response: &Response,
) -> anyhow::Result<()> {
    framed.send(serde_json::to_string(response)?).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
