//! Export-attachments command implementation.

use super::RemoteArgs;
use docsync_remote::RemoteStore;
use docsync_server::{run_migration_batch, CandidateOutcome, FileStore, MigrationReport};
use serde_json::json;
use std::path::Path;
use tracing::info;

/// Runs the export-attachments command.
pub async fn run(
    remote: &RemoteArgs,
    upload_dir: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = remote.connect()?;
    let files = FileStore::new(upload_dir);
    info!(remote = %client.identifier(), dir = %upload_dir.display(), "exporting attachments");

    let report = run_migration_batch(client.as_ref(), &files).await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report_json(&report))?),
        _ => print_text_output(&report),
    }
    Ok(())
}

fn report_json(report: &MigrationReport) -> serde_json::Value {
    let failed: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|(id, outcome)| match outcome {
            CandidateOutcome::Failed { stage, error } => Some(json!({
                "id": id.to_string(),
                "stage": stage.to_string(),
                "error": error,
            })),
            _ => None,
        })
        .collect();
    json!({
        "ok": true,
        "processed": report.processed,
        "retained": report.retained,
        "failed": failed,
    })
}

fn print_text_output(report: &MigrationReport) {
    println!("Processed: {}", report.processed);
    println!("Retained:  {}", report.retained);
    for (id, outcome) in &report.outcomes {
        match outcome {
            CandidateOutcome::Migrated { file_name } => println!("  {id} -> {file_name}"),
            CandidateOutcome::MigratedAttachmentRetained { file_name, reason } => {
                println!("  {id} -> {file_name} (inline copy kept: {reason})");
            }
            CandidateOutcome::Failed { stage, error } => {
                println!("  {id} FAILED at {stage}: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_protocol::DocumentId;
    use docsync_server::MigrationStage;

    #[test]
    fn json_lists_failures_only() {
        let report = MigrationReport {
            processed: 1,
            retained: 0,
            outcomes: vec![
                (
                    DocumentId::new("a"),
                    CandidateOutcome::Migrated {
                        file_name: "a.png".into(),
                    },
                ),
                (
                    DocumentId::new("b"),
                    CandidateOutcome::Failed {
                        stage: MigrationStage::Download,
                        error: "boom".into(),
                    },
                ),
            ],
        };
        let value = report_json(&report);
        assert_eq!(value["processed"], 1);
        assert_eq!(value["failed"].as_array().unwrap().len(), 1);
        assert_eq!(value["failed"][0]["id"], "b");
    }
}
