//! rfs server binary.
//!
//! Line-framed JSON over TCP, one request per line. See `rpc` for the
//! envelope.
//!
//! ## Usage
//!
//! ```bash
//! rfs-server --data-root /srv/rfs [--db /srv/rfs/rfs-meta.db] [--port 3000]
//! ```
//!
//! Environment fallbacks: `RFS_DATA_ROOT`, `RFS_DB_PATH`, `RFS_PORT`,
//! `RFS_ADMIN_PASSWORD`.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rfs_core::{FsConfig, Filesystem, MetaStore, ADMIN_UID};
use rfs_server::constants::{
    default_db_path, DB_FILENAME_SUFFIX, DEFAULT_BIND_ADDRESS, DEFAULT_TCP_PORT,
};
use rfs_server::{serve_connection, PasswordAccounts};

fn print_usage() {
    eprintln!(
        r#"rfs-server - remote filesystem server

USAGE:
    rfs-server [OPTIONS]

OPTIONS:
    --data-root <DIR>        Backing directory for file content (required,
                             or RFS_DATA_ROOT)
    --db <FILE>              Metadata database path; must lie outside the
                             data root (default: sibling <data-root>{db})
    --port <PORT>            TCP port (default: {port})
    --admin-password <PW>    Reset the administrator password on startup
                             (or RFS_ADMIN_PASSWORD)
    --help, -h               Show this help
"#,
        db = DB_FILENAME_SUFFIX,
        port = DEFAULT_TCP_PORT,
    );
}

struct Options {
    data_root: PathBuf,
    db_path: PathBuf,
    port: u16,
    admin_password: Option<String>,
}

fn parse_options() -> Result<Options, String> {
    let mut data_root = env::var_os("RFS_DATA_ROOT").map(PathBuf::from);
    let mut db_path = env::var_os("RFS_DB_PATH").map(PathBuf::from);
    let mut port: Option<u16> = env::var("RFS_PORT").ok().and_then(|p| p.parse().ok());
    let mut admin_password = env::var("RFS_ADMIN_PASSWORD").ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        let take_value = |i: usize| -> Result<&String, String> {
            args.get(i + 1)
                .ok_or_else(|| format!("{} requires a value", args[i]))
        };
        match args[i].as_str() {
            "--help" | "-h" => return Err(String::new()),
            "--data-root" => {
                data_root = Some(PathBuf::from(take_value(i)?));
                i += 2;
            }
            "--db" => {
                db_path = Some(PathBuf::from(take_value(i)?));
                i += 2;
            }
            "--port" => {
                port = Some(
                    take_value(i)?
                        .parse()
                        .map_err(|_| "bad --port value".to_string())?,
                );
                i += 2;
            }
            "--admin-password" => {
                admin_password = Some(take_value(i)?.clone());
                i += 2;
            }
            other => return Err(format!("unknown option: {other}")),
        }
    }

    let data_root = data_root.ok_or("--data-root (or RFS_DATA_ROOT) is required")?;
    let db_path = db_path.unwrap_or_else(|| default_db_path(&data_root));
    Ok(Options {
        data_root,
        db_path,
        port: port.unwrap_or(DEFAULT_TCP_PORT),
        admin_password,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = match parse_options() {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(options: Options) -> anyhow::Result<()> {
    // Provision directories before the stores open anything: SQLite cannot
    // create its file under a missing parent, and on a fresh --data-root
    // neither directory exists yet.
    tokio::fs::create_dir_all(&options.data_root).await?;
    if let Some(parent) = options.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // A database inside the backing root would surface in every listing of
    // "/" as an entry with no metadata row, failing readdir with EIO.
    let data_root = options.data_root.canonicalize()?;
    let db_dir = match options.db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
        _ => env::current_dir()?,
    };
    if db_dir.starts_with(&data_root) {
        anyhow::bail!(
            "--db {} is inside --data-root {}; keep the metadata database outside the backing root",
            options.db_path.display(),
            data_root.display()
        );
    }

    let config = FsConfig::new(&data_root, &options.db_path);

    let meta = Arc::new(MetaStore::open(&options.db_path)?);
    let accounts = Arc::new(PasswordAccounts::new(meta.clone()));
    let fs = Arc::new(Filesystem::new(&config, meta, accounts.clone()).await?);

    if let Some(password) = &options.admin_password {
        accounts.set_password(ADMIN_UID, password)?;
        tracing::info!("administrator password set");
    }

    let addr = format!("{DEFAULT_BIND_ADDRESS}:{}", options.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("serving {} on {addr}", data_root.display());

    loop {
        let (stream, peer) = listener.accept().await?;
        let fs = fs.clone();
        let accounts = accounts.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer, "connection opened");
            if let Err(e) = serve_connection(fs, accounts, stream).await {
                tracing::warn!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}
