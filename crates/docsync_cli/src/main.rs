//! docsync CLI
//!
//! Command-line tools for a docsync device store and its remote database.
//!
//! # Commands
//!
//! - `sync` - Replicate the local store with the remote, live or once
//! - `export-attachments` - Move inline photos on the remote into files
//! - `version` - Show version information

mod commands;

use clap::{Args, Parser, Subcommand};
use commands::RemoteArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docsync command-line tools.
#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local store directory
    #[arg(global = true, short, long, env = "DOCSYNC_PATH")]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(flatten)]
    remote: RemoteArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replicate the local store with the remote database
    Sync(SyncArgs),

    /// Move inline photos on the remote into stored files
    ExportAttachments {
        /// Directory the photos are written to
        #[arg(long, env = "DOCSYNC_UPLOAD_DIR", default_value = "static/uploads")]
        upload_dir: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Run a single replication pass and exit
    #[arg(long)]
    once: bool,

    /// Documents per replication batch
    #[arg(long, default_value_t = 100)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync(args) => {
            let path = cli.path.ok_or("Store path required for sync")?;
            commands::sync::run(&path, &cli.remote, args.once, args.batch_size).await?;
        }
        Commands::ExportAttachments { upload_dir, format } => {
            commands::export::run(&cli.remote, &upload_dir, &format).await?;
        }
        Commands::Version => {
            println!("docsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_once() {
        let cli = Cli::try_parse_from(["docsync", "--path", "/tmp/store", "sync", "--once"]).unwrap();
        assert_eq!(cli.path, Some(PathBuf::from("/tmp/store")));
        match cli.command {
            Commands::Sync(args) => {
                assert!(args.once);
                assert_eq!(args.batch_size, 100);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["docsync", "sync", "-v", "-p", "store", "--batch-size", "7"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.path, Some(PathBuf::from("store")));
        assert!(matches!(cli.command, Commands::Sync(ref args) if args.batch_size == 7 && !args.once));
    }

    #[test]
    fn remote_flags_are_accepted() {
        let cli = Cli::try_parse_from([
            "docsync",
            "--couchdb-url",
            "http://db:5984",
            "--couchdb-dbname",
            "forms",
            "export-attachments",
        ])
        .unwrap();
        assert_eq!(cli.remote.couchdb_url, "http://db:5984");
        assert_eq!(cli.remote.couchdb_dbname, "forms");
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["docsync"]).is_err());
    }
}
