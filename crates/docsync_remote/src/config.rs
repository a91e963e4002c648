//! Remote store configuration.

use std::fmt;
use std::time::Duration;

/// Connection settings for a remote CouchDB-compatible database.
#[derive(Clone)]
pub struct RemoteConfig {
    /// Server base URL, e.g. `http://localhost:5984`.
    pub base_url: String,

    /// Database name.
    pub database: String,

    /// Basic auth user name.
    pub username: Option<String>,

    /// Basic auth password.
    pub password: Option<String>,

    /// Timeout for a single request (long-poll requests add their wait).
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5984".to_string(),
            database: "submissions".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteConfig {
    /// Creates a configuration for `database` at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Sets basic auth credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the credentials to send, if both parts are present.
    #[must_use]
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_needs_both_parts() {
        let config = RemoteConfig::default();
        assert!(config.basic_auth().is_none());

        let mut config = RemoteConfig::default().with_credentials("admin", "");
        assert!(config.basic_auth().is_none());

        config.password = Some("secret".into());
        assert_eq!(config.basic_auth(), Some(("admin", "secret")));

        config.username = None;
        assert!(config.basic_auth().is_none());
    }

    #[test]
    fn debug_redacts_password() {
        let config = RemoteConfig::new("http://db", "app").with_credentials("admin", "hunter2");
        let debug = format!("{config:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
