//! CLI command implementations.

pub mod export;
pub mod sync;

use clap::Args;
use docsync_remote::{HttpRemote, RemoteConfig};
use std::sync::Arc;
use tracing::warn;

/// Connection settings for the remote database.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Base URL of the CouchDB server
    #[arg(global = true, long, env = "COUCHDB_URL", default_value = "http://localhost:5984")]
    pub couchdb_url: String,

    /// Database name
    #[arg(global = true, long, env = "COUCHDB_DBNAME", default_value = "submissions")]
    pub couchdb_dbname: String,

    /// Database user
    #[arg(global = true, long, env = "COUCHDB_USERNAME")]
    pub couchdb_username: Option<String>,

    /// Database password
    #[arg(global = true, long, env = "COUCHDB_PASSWORD", hide_env_values = true)]
    pub couchdb_password: Option<String>,
}

impl RemoteArgs {
    /// Builds the client configuration.
    pub fn config(&self) -> RemoteConfig {
        RemoteConfig::new(self.couchdb_url.clone(), self.couchdb_dbname.clone()).with_credentials(
            self.couchdb_username.clone().unwrap_or_default(),
            self.couchdb_password.clone().unwrap_or_default(),
        )
    }

    /// Connects an HTTP client to the configured database.
    pub fn connect(&self) -> Result<Arc<HttpRemote>, Box<dyn std::error::Error>> {
        let config = self.config();
        if config.basic_auth().is_none() {
            warn!("no database credentials configured, requests are sent unauthenticated");
        }
        Ok(Arc::new(HttpRemote::new(config)?))
    }
}
