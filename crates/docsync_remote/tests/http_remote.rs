//! HttpRemote against a mocked CouchDB.

use docsync_core::DocumentStore;
use docsync_protocol::{
    ApplyOutcome, Document, DocumentId, Feed, Revision, RevisionedDocument, Revisions,
    RevsDiffRequest, Sequence,
};
use docsync_remote::{HttpRemote, RemoteConfig, RemoteError, RemoteStore};
use serde_json::{json, Map};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote(server: &MockServer) -> HttpRemote {
    let config = RemoteConfig::new(server.uri(), "app")
        .with_credentials("admin", "secret")
        .with_timeout(Duration::from_secs(5));
    HttpRemote::new(config).unwrap()
}

fn doc_json(id: &str, rev: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "_rev": rev,
        "type": "submission",
        "status": "pending",
        "fields": {"name": "Ann"},
        "createdAt": "2024-05-01T10:00:00.000Z",
        "updatedAt": "2024-05-01T10:00:00.000Z",
        "_attachments": {"photo": {"content_type": "image/jpeg", "stub": true, "length": 4}}
    })
}

// ── Authentication ──────────────────────────────────────────────

#[tokio::test]
async fn basic_auth_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/doc1"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc_json("doc1", "1-a")))
        .expect(1)
        .mount(&server)
        .await;

    let doc = remote(&server)
        .get_document(&DocumentId::new("doc1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["_rev"], "1-a");
    assert_eq!(doc["_attachments"]["photo"]["stub"], true);
}

#[tokio::test]
async fn no_auth_header_without_password() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/doc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc_json("doc1", "1-a")))
        .mount(&server)
        .await;

    let mut config = RemoteConfig::new(server.uri(), "app");
    config.username = Some("admin".into());
    let remote = HttpRemote::new(config).unwrap();
    remote.get_document(&DocumentId::new("doc1")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn unauthorized_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/_changes"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "unauthorized", "reason": "Name or password is incorrect."})),
        )
        .mount(&server)
        .await;

    let err = remote(&server)
        .changes(&Sequence::start(), 10, Feed::Normal)
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(!err.is_retryable());
    assert!(!err.to_string().contains("secret"));
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/_changes"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = remote(&server)
        .changes(&Sequence::start(), 10, Feed::Normal)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Nothing listens on port 1.
    let config = RemoteConfig::new("http://127.0.0.1:1", "app").with_timeout(Duration::from_secs(2));
    let remote = HttpRemote::new(config).unwrap();
    let err = remote.ping().await.unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)), "{err:?}");
}

// ── Database lifecycle ──────────────────────────────────────────

#[tokio::test]
async fn ensure_database_creates_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not_found"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    remote(&server).ensure_database().await.unwrap();
}

#[tokio::test]
async fn ensure_database_tolerates_concurrent_create() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({"error": "file_exists"})))
        .mount(&server)
        .await;

    remote(&server).ensure_database().await.unwrap();
}

#[tokio::test]
async fn ensure_database_skips_create_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"db_name": "app"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    remote(&server).ensure_database().await.unwrap();
}

// ── Replication primitives ──────────────────────────────────────

#[tokio::test]
async fn changes_request_and_parse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/_changes"))
        .and(query_param("since", "0"))
        .and(query_param("limit", "50"))
        .and(query_param("style", "all_docs"))
        .and(query_param("feed", "longpoll"))
        .and(query_param("timeout", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"seq": "3-abc", "id": "doc1", "changes": [{"rev": "2-b"}]}],
            "last_seq": "3-abc",
            "pending": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = remote(&server)
        .changes(&Sequence::start(), 50, Feed::LongPoll(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(page.results[0].id, DocumentId::new("doc1"));
    assert_eq!(page.results[0].revs, vec![Revision::new(2, "b")]);
    assert_eq!(page.last_seq, Sequence::new("3-abc"));
}

#[tokio::test]
async fn revs_diff_returns_missing_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/_revs_diff"))
        .and(body_json(json!({"a": ["1-x"], "b": ["2-y"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "a": {"missing": ["1-x"], "possible_ancestors": []}
        })))
        .mount(&server)
        .await;

    let mut request = RevsDiffRequest::new();
    request.insert(DocumentId::new("a"), vec![Revision::new(1, "x")]);
    request.insert(DocumentId::new("b"), vec![Revision::new(2, "y")]);

    let diff = remote(&server).revs_diff(&request).await.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[&DocumentId::new("a")], vec![Revision::new(1, "x")]);
}

#[tokio::test]
async fn get_revisions_uses_open_revs() {
    let server = MockServer::start().await;
    let mut found = doc_json("doc1", "2-b");
    found["_revisions"] = json!({"start": 2, "ids": ["b", "a"]});
    found["_attachments"] = json!({"photo": {"content_type": "image/jpeg", "data": "/9j/"}});

    Mock::given(method("GET"))
        .and(path("/app/doc1"))
        .and(query_param("open_revs", r#"["2-b","2-c"]"#))
        .and(query_param("revs", "true"))
        .and(query_param("attachments", "true"))
        .and(query_param("latest", "true"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"ok": found}, {"missing": "2-c"}])),
        )
        .mount(&server)
        .await;

    let docs = remote(&server)
        .get_revisions(
            &DocumentId::new("doc1"),
            &[Revision::new(2, "b"), Revision::new(2, "c")],
        )
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].history(), vec![Revision::new(2, "b"), Revision::new(1, "a")]);
    assert_eq!(
        docs[0].document.attachments["photo"].data.as_deref(),
        Some(&b"\xff\xd8\xff"[..])
    );
}

#[tokio::test]
async fn bulk_replicate_reports_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/_bulk_docs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {"id": "b", "error": "forbidden", "reason": "read only"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let docs: Vec<RevisionedDocument> = ["a", "b"]
        .iter()
        .map(|id| {
            let mut document = Document::new(DocumentId::new(*id), "submission", Map::new());
            let rev = Revision::new(1, "h");
            document.revision = Some(rev.clone());
            RevisionedDocument {
                document,
                revisions: Revisions::from_history(&[rev]),
            }
        })
        .collect();

    let outcomes = remote(&server).bulk_replicate(docs).await.unwrap();
    assert_eq!(outcomes[0], ApplyOutcome::Applied(DocumentId::new("a")));
    assert_eq!(
        outcomes[1],
        ApplyOutcome::Rejected {
            id: DocumentId::new("b"),
            reason: "forbidden: read only".into()
        }
    );

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["new_edits"], false);
    assert_eq!(body["docs"][0]["_revisions"], json!({"start": 1, "ids": ["h"]}));
}

// ── Documents and attachments ───────────────────────────────────

#[tokio::test]
async fn missing_document_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/ghost"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "not_found", "reason": "missing"})),
        )
        .mount(&server)
        .await;

    let doc = remote(&server).get_document(&DocumentId::new("ghost")).await.unwrap();
    assert!(doc.is_none());
}

#[tokio::test]
async fn all_documents_skips_rows_without_docs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/_all_docs"))
        .and(query_param("include_docs", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                {"id": "doc1", "key": "doc1", "value": {"rev": "1-a"}, "doc": doc_json("doc1", "1-a")},
                {"key": "gone", "error": "not_found"}
            ]
        })))
        .mount(&server)
        .await;

    let docs = remote(&server).all_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["_id"], "doc1");
}

#[tokio::test]
async fn all_documents_keeps_foreign_rows_as_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/_all_docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [
                {"id": "settings", "doc": {"_id": "settings", "_rev": "1-s", "type": "settings", "status": 1}},
                {"id": "doc1", "doc": doc_json("doc1", "1-a")},
                {"id": "old", "doc": {"_id": "old", "_rev": "2-d", "_deleted": true}}
            ]
        })))
        .mount(&server)
        .await;

    let docs = remote(&server).all_documents().await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["status"], 1);
    assert_eq!(docs[0]["type"], "settings");
    assert_eq!(docs[1]["_id"], "doc1");
}

#[tokio::test]
async fn get_revisions_reports_unreadable_body_as_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/doc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ok": {"_id": "doc1", "_rev": "2-b", "status": 1}}
        ])))
        .mount(&server)
        .await;

    let err = remote(&server)
        .get_revisions(&DocumentId::new("doc1"), &[Revision::new(2, "b")])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn put_document_sends_body_untouched() {
    let server = MockServer::start().await;
    let body = json!({
        "_id": "doc1",
        "_rev": "1-a",
        "type": "submission",
        "owner": "alice",
        "status": "escalated",
        "fields": {"_hint": 3}
    });
    Mock::given(method("PUT"))
        .and(path("/app/doc1"))
        .and(body_json(body.clone()))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "doc1", "rev": "2-n"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let raw = body.as_object().cloned().unwrap();
    let rev = remote(&server)
        .put_document(&DocumentId::new("doc1"), &raw)
        .await
        .unwrap();
    assert_eq!(rev, Revision::new(2, "n"));
}

#[tokio::test]
async fn put_document_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/app/doc1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": "conflict", "reason": "Document update conflict."
        })))
        .mount(&server)
        .await;

    let body = doc_json("doc1", "1-a").as_object().cloned().unwrap();
    let err = remote(&server)
        .put_document(&DocumentId::new("doc1"), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict(_)));
}

#[tokio::test]
async fn fetch_attachment_streams_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/doc1/photo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpegdata".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;

    let stream = remote(&server)
        .fetch_attachment(&DocumentId::new("doc1"), "photo")
        .await
        .unwrap();
    assert_eq!(stream.content_type, "image/jpeg");
    assert_eq!(stream.content_length, Some(8));
    assert_eq!(&stream.into_bytes().await.unwrap()[..], b"jpegdata");
}

#[tokio::test]
async fn delete_attachment_sends_revision() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/app/doc1/photo"))
        .and(query_param("rev", "2-b"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "id": "doc1", "rev": "3-c"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rev = remote(&server)
        .delete_attachment(&DocumentId::new("doc1"), "photo", &Revision::new(2, "b"))
        .await
        .unwrap();
    assert_eq!(rev, Revision::new(3, "c"));
}
