//! Moves inline submission photos out of the remote database into file storage.

use crate::error::{ServerError, ServerResult};
use crate::files::{generate_name, FileStore};
use chrono::{SecondsFormat, Utc};
use docsync_protocol::{
    is_image_name_set, DocumentId, RawDocument, IMAGE_NAME_FIELD, PHOTO_ATTACHMENT, SUBMISSION_KIND,
};
use docsync_remote::RemoteStore;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{error, info, warn};

/// Extension used when the content type is not a known image type.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Step of a candidate migration that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStage {
    /// Reading the attachment bytes.
    Download,
    /// Writing the file.
    Store,
    /// Recording the file name on the document.
    Update,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationStage::Download => "download",
            MigrationStage::Store => "store",
            MigrationStage::Update => "update",
        })
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// The photo now lives in file storage and was removed from the document.
    Migrated {
        /// Stored file name.
        file_name: String,
    },
    /// The photo was copied and recorded, but the inline copy could not be removed.
    MigratedAttachmentRetained {
        /// Stored file name.
        file_name: String,
        /// Why the inline copy is still there.
        reason: String,
    },
    /// Nothing was recorded on the document.
    Failed {
        /// Step that failed.
        stage: MigrationStage,
        /// Error message.
        error: String,
    },
}

impl CandidateOutcome {
    /// Returns true if the document now references a stored file.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        !matches!(self, CandidateOutcome::Failed { .. })
    }
}

/// Result of one migration batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Candidates whose document now references a stored file.
    pub processed: usize,
    /// Processed candidates that still carry the inline photo.
    pub retained: usize,
    /// Per-candidate outcomes, in processing order.
    pub outcomes: Vec<(DocumentId, CandidateOutcome)>,
}

/// Maps an image content type to a file extension.
///
/// Parameters such as `; charset=...` are ignored.
#[must_use]
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/bmp" => ".bmp",
        "image/svg+xml" => ".svg",
        "image/avif" => ".avif",
        _ => FALLBACK_EXTENSION,
    }
}

/// Returns true if a stored body still carries an inline photo to move.
///
/// Only `type`, `_deleted`, `fields.imageName` and the photo stub are read,
/// so bodies written by other clients qualify as long as those keys do.
#[must_use]
pub fn needs_photo_migration(body: &RawDocument) -> bool {
    let is_submission = body.get("type").and_then(Value::as_str) == Some(SUBMISSION_KIND);
    let deleted = body.get("_deleted").and_then(Value::as_bool) == Some(true);
    let has_photo = body
        .get("_attachments")
        .and_then(Value::as_object)
        .is_some_and(|attachments| attachments.contains_key(PHOTO_ATTACHMENT));
    let image_name_set = match body.get("fields") {
        None | Some(Value::Null) => false,
        Some(Value::Object(fields)) => fields.get(IMAGE_NAME_FIELD).is_some_and(is_image_name_set),
        Some(_) => {
            if is_submission && has_photo && !deleted {
                warn!(id = ?body.get("_id"), "skipping submission whose fields are not an object");
            }
            return false;
        }
    };
    is_submission && !deleted && has_photo && !image_name_set
}

/// Migrates every eligible submission, one at a time.
///
/// Documents are handled as stored JSON: only `fields.imageName` and
/// `updatedAt` are written, every other key goes back untouched.
/// A failing candidate is recorded and skipped; the rest still run.
///
/// # Errors
///
/// Returns an error only if the documents cannot be listed.
pub async fn run_migration_batch(
    remote: &dyn RemoteStore,
    files: &FileStore,
) -> ServerResult<MigrationReport> {
    let documents = remote.all_documents().await.map_err(ServerError::Upstream)?;
    let candidates: Vec<(DocumentId, RawDocument)> = documents
        .into_iter()
        .filter(needs_photo_migration)
        .filter_map(|body| match body.get("_id").and_then(Value::as_str) {
            Some(id) => Some((DocumentId::new(id), body)),
            None => {
                warn!("skipping migration candidate without an id");
                None
            }
        })
        .collect();
    info!(candidates = candidates.len(), "starting attachment migration");

    let mut report = MigrationReport::default();
    for (id, body) in candidates {
        let outcome = migrate(remote, files, &id, body).await;
        match &outcome {
            CandidateOutcome::Migrated { file_name } => {
                info!(%id, file_name, "migrated photo");
            }
            CandidateOutcome::MigratedAttachmentRetained { file_name, reason } => {
                warn!(%id, file_name, reason, "migrated photo, inline copy retained");
                report.retained += 1;
            }
            CandidateOutcome::Failed { stage, error } => {
                error!(%id, %stage, error, "photo migration failed");
            }
        }
        if outcome.is_processed() {
            report.processed += 1;
        }
        report.outcomes.push((id, outcome));
    }

    info!(processed = report.processed, retained = report.retained, "attachment migration finished");
    Ok(report)
}

fn record_file_name(body: &mut RawDocument, file_name: &str) {
    let fields = body
        .entry("fields")
        .or_insert_with(|| Value::Object(Map::new()));
    if !fields.is_object() {
        *fields = Value::Object(Map::new());
    }
    if let Value::Object(fields) = fields {
        fields.insert(IMAGE_NAME_FIELD.to_string(), Value::String(file_name.to_string()));
    }
    body.insert(
        "updatedAt".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
}

async fn migrate(
    remote: &dyn RemoteStore,
    files: &FileStore,
    id: &DocumentId,
    mut body: RawDocument,
) -> CandidateOutcome {
    let failed = |stage: MigrationStage, error: String| CandidateOutcome::Failed { stage, error };

    let stream = match remote.fetch_attachment(id, PHOTO_ATTACHMENT).await {
        Ok(stream) => stream,
        Err(err) => return failed(MigrationStage::Download, err.to_string()),
    };
    let file_name = generate_name(extension_for(&stream.content_type));
    let data = match stream.into_bytes().await {
        Ok(data) => data,
        Err(err) => return failed(MigrationStage::Download, err.to_string()),
    };

    if let Err(err) = files.write(&file_name, &data).await {
        return failed(MigrationStage::Store, err.to_string());
    }

    record_file_name(&mut body, &file_name);
    let revision = match remote.put_document(id, &body).await {
        Ok(revision) => revision,
        Err(err) => return failed(MigrationStage::Update, err.to_string()),
    };

    match remote.delete_attachment(id, PHOTO_ATTACHMENT, &revision).await {
        Ok(_) => CandidateOutcome::Migrated { file_name },
        Err(err) => CandidateOutcome::MigratedAttachmentRetained {
            file_name,
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extension_map() {
        assert_eq!(extension_for("image/png"), ".png");
        assert_eq!(extension_for("image/jpeg"), ".jpg");
        assert_eq!(extension_for("image/jpg"), ".jpg");
        assert_eq!(extension_for("image/svg+xml"), ".svg");
        assert_eq!(extension_for("IMAGE/WEBP; q=0.9"), ".webp");
        assert_eq!(extension_for("image/avif"), ".avif");
        assert_eq!(extension_for("application/pdf"), ".bin");
        assert_eq!(extension_for(""), ".bin");
    }

    fn raw(value: Value) -> RawDocument {
        match value {
            Value::Object(body) => body,
            _ => unreachable!(),
        }
    }

    #[test]
    fn candidate_selection_reads_raw_keys() {
        let photo = json!({"photo": {"content_type": "image/png", "stub": true}});
        assert!(needs_photo_migration(&raw(json!({
            "_id": "a", "type": "submission", "status": 7, "_attachments": photo
        }))));
        assert!(needs_photo_migration(&raw(json!({
            "_id": "a", "type": "submission", "fields": {"imageName": ""}, "_attachments": photo
        }))));
        assert!(!needs_photo_migration(&raw(json!({
            "_id": "a", "type": "submission", "fields": {"imageName": "x.png"}, "_attachments": photo
        }))));
        assert!(!needs_photo_migration(&raw(json!({
            "_id": "a", "type": "settings", "_attachments": photo
        }))));
        assert!(!needs_photo_migration(&raw(json!({
            "_id": "a", "type": "submission", "fields": "text", "_attachments": photo
        }))));
        assert!(!needs_photo_migration(&raw(json!({"_id": "a", "type": "submission"}))));
    }

    #[test]
    fn recording_touches_only_two_keys() {
        let mut body = raw(json!({
            "_id": "a",
            "_rev": "1-x",
            "type": "submission",
            "owner": "alice",
            "status": "escalated"
        }));
        record_file_name(&mut body, "f.png");

        assert_eq!(body["fields"]["imageName"], "f.png");
        assert!(body["updatedAt"].as_str().is_some_and(|t| t.ends_with('Z')));
        assert_eq!(body["owner"], "alice");
        assert_eq!(body["status"], "escalated");
        assert!(!body.contains_key("createdAt"));
        assert_eq!(body.len(), 7);
    }

    #[test]
    fn processed_outcomes() {
        assert!(CandidateOutcome::Migrated {
            file_name: "a".into()
        }
        .is_processed());
        assert!(CandidateOutcome::MigratedAttachmentRetained {
            file_name: "a".into(),
            reason: "r".into()
        }
        .is_processed());
        assert!(!CandidateOutcome::Failed {
            stage: MigrationStage::Store,
            error: "e".into()
        }
        .is_processed());
        assert_eq!(MigrationStage::Download.to_string(), "download");
    }
}
