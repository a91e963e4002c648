//! reqwest-based client for CouchDB-compatible servers.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::store::{AttachmentStream, RemoteStore};
use async_trait::async_trait;
use docsync_core::DocumentStore;
use docsync_protocol::{
    ApplyOutcome, ChangesPage, DocumentId, Feed, RawDocument, Revision,
    RevisionedDocument, RevsDiff, RevsDiffRequest, Sequence, DEFAULT_CONTENT_TYPE,
};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct WriteResponse {
    rev: Revision,
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RevsDiffEntry {
    #[serde(default)]
    missing: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OpenRev {
    Found { ok: RevisionedDocument },
    Missing {
        #[allow(dead_code)]
        missing: String,
    },
}

#[derive(Debug, Deserialize)]
struct BulkDocsResult {
    id: DocumentId,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// A remote database reached over HTTP.
///
/// Credentials are sent as a basic auth header when both user name and
/// password are configured; they never appear in URLs, logs or errors.
///
/// # Example
///
/// ```no_run
/// use docsync_remote::{HttpRemote, RemoteConfig, RemoteStore};
///
/// # async fn run() -> Result<(), docsync_remote::RemoteError> {
/// let config = RemoteConfig::new("http://localhost:5984", "submissions")
///     .with_credentials("admin", "secret");
/// let remote = HttpRemote::new(config)?;
/// remote.ensure_database().await?;
/// let docs = remote.all_documents().await?;
/// println!("{} documents", docs.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpRemote {
    config: RemoteConfig,
    client: Client,
    db_url: Url,
}

impl HttpRemote {
    /// Creates a client for the configured database.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Http`] if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RemoteError::Http(e.without_url().to_string()))?;
        Self::with_client(config, client)
    }

    /// Creates a client over an existing reqwest client.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Http`] if the base URL is invalid.
    pub fn with_client(config: RemoteConfig, client: Client) -> RemoteResult<Self> {
        let mut db_url = Url::parse(config.base_url.trim())
            .map_err(|e| RemoteError::Http(format!("invalid base URL: {e}")))?;
        // Credentials belong in the auth header only.
        let _ = db_url.set_username("");
        let _ = db_url.set_password(None);
        db_url
            .path_segments_mut()
            .map_err(|()| RemoteError::Http("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(&config.database);

        Ok(Self {
            config,
            client,
            db_url,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.db_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .timeout(self.config.timeout);
        match self.config.basic_auth() {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "remote request failed");
        Err(RemoteError::from_status(status.as_u16(), &body))
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(builder.header(ACCEPT, "application/json")).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DocumentStore for HttpRemote {
    type Error = RemoteError;

    async fn changes(
        &self,
        since: &Sequence,
        limit: usize,
        feed: Feed,
    ) -> RemoteResult<ChangesPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("since", since.to_string()),
            ("limit", limit.max(1).to_string()),
            ("style", "all_docs".to_string()),
        ];
        let mut timeout = self.config.timeout;
        if let Feed::LongPoll(wait) = feed {
            query.push(("feed", "longpoll".to_string()));
            query.push(("timeout", wait.as_millis().to_string()));
            timeout += wait;
        }

        let builder = self
            .request(Method::GET, self.url(&["_changes"]))
            .query(&query)
            .timeout(timeout);
        let page: ChangesPage = self.json(builder).await?;
        tracing::trace!(changes = page.results.len(), last_seq = %page.last_seq, "remote changes");
        Ok(page)
    }

    async fn revs_diff(&self, request: &RevsDiffRequest) -> RemoteResult<RevsDiff> {
        if request.is_empty() {
            return Ok(RevsDiff::new());
        }
        let builder = self
            .request(Method::POST, self.url(&["_revs_diff"]))
            .json(request);
        let response: BTreeMap<DocumentId, RevsDiffEntry> = self.json(builder).await?;
        Ok(response
            .into_iter()
            .filter(|(_, entry)| !entry.missing.is_empty())
            .map(|(id, entry)| (id, entry.missing))
            .collect())
    }

    async fn get_revisions(
        &self,
        id: &DocumentId,
        revs: &[Revision],
    ) -> RemoteResult<Vec<RevisionedDocument>> {
        if revs.is_empty() {
            return Ok(Vec::new());
        }
        let open_revs = serde_json::to_string(revs)?;
        let builder = self
            .request(Method::GET, self.url(&[id.as_str()]))
            .query(&[
                ("open_revs", open_revs.as_str()),
                ("revs", "true"),
                ("attachments", "true"),
                ("latest", "true"),
            ]);

        match self.json::<Vec<OpenRev>>(builder).await {
            Ok(found) => Ok(found
                .into_iter()
                .filter_map(|rev| match rev {
                    OpenRev::Found { ok } => Some(ok),
                    OpenRev::Missing { .. } => None,
                })
                .collect()),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn bulk_replicate(
        &self,
        docs: Vec<RevisionedDocument>,
    ) -> RemoteResult<Vec<ApplyOutcome>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let builder = self
            .request(Method::POST, self.url(&["_bulk_docs"]))
            .json(&json!({ "docs": docs, "new_edits": false }));
        let results: Vec<BulkDocsResult> = self.json(builder).await?;

        let mut errors: HashMap<DocumentId, String> = results
            .into_iter()
            .filter_map(|r| {
                let error = r.error?;
                let reason = r.reason.map_or(error.clone(), |reason| format!("{error}: {reason}"));
                Some((r.id, reason))
            })
            .collect();

        Ok(docs
            .into_iter()
            .map(|doc| {
                let id = doc.document.id;
                match errors.remove(&id) {
                    Some(reason) => ApplyOutcome::Rejected { id, reason },
                    None => ApplyOutcome::Applied(id),
                }
            })
            .collect())
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn identifier(&self) -> String {
        self.db_url.to_string()
    }

    async fn ping(&self) -> RemoteResult<()> {
        let url = self.db_url.clone();
        self.request(Method::GET, url)
            .timeout(self.config.timeout.min(Duration::from_secs(10)))
            .send()
            .await?;
        Ok(())
    }

    async fn ensure_database(&self) -> RemoteResult<()> {
        let exists = self.request(Method::GET, self.db_url.clone());
        match self.send(exists).await {
            Ok(_) => return Ok(()),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let create = self.request(Method::PUT, self.db_url.clone());
        let response = create.send().await?;
        match response.status() {
            status if status.is_success() => {
                tracing::info!(database = %self.config.database, "created remote database");
                Ok(())
            }
            // Created concurrently by someone else.
            StatusCode::PRECONDITION_FAILED => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::from_status(status.as_u16(), &body))
            }
        }
    }

    async fn all_documents(&self) -> RemoteResult<Vec<RawDocument>> {
        let builder = self
            .request(Method::GET, self.url(&["_all_docs"]))
            .query(&[("include_docs", "true")]);
        let response: AllDocsResponse = self.json(builder).await?;
        Ok(response
            .rows
            .into_iter()
            .filter_map(|row| match row.doc {
                Some(Value::Object(body)) => Some(body),
                Some(other) => {
                    tracing::warn!(body = %other, "skipping non-object row");
                    None
                }
                None => None,
            })
            .filter(|body| body.get("_deleted").and_then(Value::as_bool) != Some(true))
            .collect())
    }

    async fn get_document(&self, id: &DocumentId) -> RemoteResult<Option<RawDocument>> {
        let builder = self.request(Method::GET, self.url(&[id.as_str()]));
        match self.json(builder).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn put_document(&self, id: &DocumentId, body: &RawDocument) -> RemoteResult<Revision> {
        let builder = self
            .request(Method::PUT, self.url(&[id.as_str()]))
            .json(body);
        let written: WriteResponse = self.json(builder).await?;
        tracing::debug!(%id, rev = %written.rev, "remote document written");
        Ok(written.rev)
    }

    async fn fetch_attachment(&self, id: &DocumentId, name: &str) -> RemoteResult<AttachmentStream> {
        let builder = self.request(Method::GET, self.url(&[id.as_str(), name]));
        let response = self.send(builder).await?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(AttachmentStream {
            content_type,
            content_length,
            body: response.bytes_stream().map_err(RemoteError::from).boxed(),
        })
    }

    async fn delete_attachment(
        &self,
        id: &DocumentId,
        name: &str,
        rev: &Revision,
    ) -> RemoteResult<Revision> {
        let builder = self
            .request(Method::DELETE, self.url(&[id.as_str(), name]))
            .query(&[("rev", rev.to_string())]);
        let written: WriteResponse = self.json(builder).await?;
        Ok(written.rev)
    }
}
