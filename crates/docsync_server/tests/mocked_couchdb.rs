//! Migration and proxy against a mocked CouchDB.

use docsync_remote::{HttpRemote, RemoteConfig};
use docsync_protocol::DocumentId;
use docsync_server::{
    fetch_attachment, run_migration_batch, CandidateOutcome, FileStore, MigrationStage,
};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote(server: &MockServer) -> HttpRemote {
    let config = RemoteConfig::new(server.uri(), "app").with_timeout(Duration::from_secs(5));
    HttpRemote::new(config).unwrap()
}

fn files() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::new(dir.path().join("uploads"));
    (dir, files)
}

/// A submission written by another client: extra keys, no `createdAt`,
/// a status this crate does not know.
fn foreign_submission() -> Value {
    json!({
        "_id": "sub1",
        "_rev": "3-c",
        "type": "submission",
        "owner": "alice",
        "status": "escalated",
        "fields": {"name": "Ann", "tags": ["a", "b"]},
        "_attachments": {
            "photo": {"content_type": "image/jpeg", "stub": true, "length": 4, "digest": "md5-x"}
        }
    })
}

async fn mount_listing(server: &MockServer, rows: Vec<Value>) {
    let rows: Vec<Value> = rows
        .into_iter()
        .map(|doc| {
            let id = doc["_id"].clone();
            json!({ "id": id, "doc": doc })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/app/_all_docs"))
        .and(query_param("include_docs", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": rows })))
        .mount(server)
        .await;
}

async fn mount_candidate_io(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/app/sub1/photo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(&b"jpeg"[..]),
        )
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/app/sub1"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "sub1", "rev": "4-d"})),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/app/sub1/photo"))
        .and(query_param("rev", "4-d"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "id": "sub1", "rev": "5-e"})),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn put_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|request| request.method.as_str() == "PUT")
        .unwrap();
    serde_json::from_slice(&put.body).unwrap()
}

// ── Listing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn foreign_documents_do_not_fail_the_batch() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        vec![
            json!({"_id": "settings", "_rev": "1-s", "type": "settings", "status": 1}),
            json!({"_id": "_design/app", "_rev": "1-v", "views": {}}),
            foreign_submission(),
        ],
    )
    .await;
    mount_candidate_io(&server).await;
    let (_dir, files) = files();

    let report = run_migration_batch(&remote(&server), &files).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.retained, 0);
    assert_eq!(report.outcomes[0].0.as_str(), "sub1");
    let CandidateOutcome::Migrated { file_name } = &report.outcomes[0].1 else {
        panic!("unexpected outcome {:?}", report.outcomes[0].1);
    };
    assert!(file_name.ends_with(".jpg"));
    assert_eq!(files.read(file_name).await.unwrap(), b"jpeg");
}

#[tokio::test]
async fn nothing_is_written_without_candidates() {
    let server = MockServer::start().await;
    let mut done = foreign_submission();
    done["fields"]["imageName"] = json!("old.jpg");
    mount_listing(
        &server,
        vec![done, json!({"_id": "gone", "_rev": "2-g", "_deleted": true, "type": "submission"})],
    )
    .await;
    let (_dir, files) = files();

    let report = run_migration_batch(&remote(&server), &files).await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(report.outcomes.is_empty());
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

// ── Written body ───────────────────────────────────────────────────────

#[tokio::test]
async fn put_keeps_every_unrelated_key() {
    let server = MockServer::start().await;
    mount_listing(&server, vec![foreign_submission()]).await;
    mount_candidate_io(&server).await;
    let (_dir, files) = files();

    let report = run_migration_batch(&remote(&server), &files).await.unwrap();
    let CandidateOutcome::Migrated { file_name } = &report.outcomes[0].1 else {
        panic!("unexpected outcome {:?}", report.outcomes[0].1);
    };

    let body = put_body(&server).await;
    assert_eq!(body["_id"], "sub1");
    assert_eq!(body["_rev"], "3-c");
    assert_eq!(body["owner"], "alice");
    assert_eq!(body["status"], "escalated");
    assert_eq!(body["fields"]["name"], "Ann");
    assert_eq!(body["fields"]["tags"], json!(["a", "b"]));
    assert_eq!(body["fields"]["imageName"], json!(file_name));
    assert_eq!(body["_attachments"]["photo"]["digest"], "md5-x");
    assert!(body.get("createdAt").is_none());
    assert!(body["updatedAt"].as_str().is_some_and(|t| t.ends_with('Z')));

    // Only `fields.imageName` and `updatedAt` differ from what was listed.
    let mut expected = foreign_submission();
    expected["fields"]["imageName"] = json!(file_name);
    expected["updatedAt"] = body["updatedAt"].clone();
    assert_eq!(body, expected);
}

#[tokio::test]
async fn fields_object_is_created_when_missing() {
    let server = MockServer::start().await;
    let mut bare = foreign_submission();
    bare.as_object_mut().unwrap().remove("fields");
    mount_listing(&server, vec![bare]).await;
    mount_candidate_io(&server).await;
    let (_dir, files) = files();

    let report = run_migration_batch(&remote(&server), &files).await.unwrap();
    assert_eq!(report.processed, 1);
    let body = put_body(&server).await;
    assert_eq!(body["fields"].as_object().unwrap().len(), 1);
    assert!(body["fields"]["imageName"].as_str().is_some());
    assert_eq!(body["owner"], "alice");
}

#[tokio::test]
async fn rejected_put_leaves_the_attachment() {
    let server = MockServer::start().await;
    mount_listing(&server, vec![foreign_submission()]).await;
    Mock::given(method("GET"))
        .and(path("/app/sub1/photo"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"jpeg"[..]))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/app/sub1"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"error": "conflict", "reason": "Document update conflict."})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let (_dir, files) = files();

    let report = run_migration_batch(&remote(&server), &files).await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(matches!(
        report.outcomes[0].1,
        CandidateOutcome::Failed { stage: MigrationStage::Update, .. }
    ));
}

// ── Proxy ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn proxy_reads_names_from_foreign_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/sub1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "sub1",
            "_rev": "1-a",
            "status": 1,
            "fields": "free text",
            "_attachments": {
                "zeta": {"content_type": "image/png", "stub": true},
                "image": {"content_type": "image/png", "stub": true}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/sub1/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"png".to_vec(), "image/png"))
        .mount(&server)
        .await;

    let stream = fetch_attachment(&remote(&server), &DocumentId::new("sub1"), None)
        .await
        .unwrap();
    assert_eq!(stream.content_type, "image/png");
    assert_eq!(&stream.into_bytes().await.unwrap()[..], b"png");
}
