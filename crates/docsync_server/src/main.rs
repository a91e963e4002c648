//! docsync server binary.

use clap::Parser;
use docsync_remote::RemoteConfig;
use docsync_server::{serve, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Attachment proxy, migration and upload server.
#[derive(Parser, Debug)]
#[command(name = "docsync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "DOCSYNC_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Base URL of the CouchDB server
    #[arg(long, env = "COUCHDB_URL", default_value = "http://localhost:5984")]
    couchdb_url: String,

    /// Database name
    #[arg(long, env = "COUCHDB_DBNAME", default_value = "submissions")]
    couchdb_dbname: String,

    /// Database user
    #[arg(long, env = "COUCHDB_USERNAME")]
    couchdb_username: Option<String>,

    /// Database password
    #[arg(long, env = "COUCHDB_PASSWORD", hide_env_values = true)]
    couchdb_password: Option<String>,

    /// Directory for uploaded and migrated files
    #[arg(long, env = "DOCSYNC_UPLOAD_DIR", default_value = "static/uploads")]
    upload_dir: PathBuf,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let remote = RemoteConfig::new(args.couchdb_url, args.couchdb_dbname).with_credentials(
        args.couchdb_username.unwrap_or_default(),
        args.couchdb_password.unwrap_or_default(),
    );
    if remote.basic_auth().is_none() {
        warn!("no database credentials configured, requests are sent unauthenticated");
    }

    let config = ServerConfig::new(args.bind)
        .with_remote(remote)
        .with_upload_dir(args.upload_dir)
        .with_max_upload_bytes(args.max_upload_bytes)
        .with_request_timeout(Duration::from_secs(args.timeout_secs));

    serve(config, async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await?;
    Ok(())
}
