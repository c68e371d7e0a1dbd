//! Command dispatch for UI collaborators.
//!
//! A front end sends one [`Command`] per user action (submit the form,
//! check a field, export, show statistics) and gets an [`AppResponse`] back.
//! Nothing here depends on how the front end is built.

use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analytics;
use crate::app_response::AppResponse;
use crate::error::StoreError;
use crate::evidence_blob::{EvidenceBlob, PathBlob};
use crate::export;
use crate::local_db_model::{FileCategory, ReportFields};
use crate::local_db_state::ReportDbState;
use crate::validation::{self, AttachmentSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    SubmitReport {
        fields: ReportFields,
        #[serde(default)]
        attachments: Vec<AttachmentRef>,
    },
    ValidateField {
        name: String,
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    Export {
        output_dir: PathBuf,
    },
    Statistics,
    ListReports,
    ReportsByOperator {
        operator: String,
    },
    #[serde(rename_all = "camelCase")]
    FilesForReport {
        report_id: u64,
    },
}

/// An attachment to upload, by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub path: PathBuf,
    pub category: FileCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFile {
    pub id: u64,
    pub file_name: String,
    pub file_type: FileCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub file_name: String,
    pub file_type: FileCategory,
    pub error: String,
}

/// Result of a submission whose report was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub report_id: u64,
    pub saved_files: Vec<SavedFile>,
    pub failed_files: Vec<FailedFile>,
}

impl SubmissionOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_files.is_empty()
    }
}

pub fn dispatch(store: &ReportDbState, command: Command) -> AppResponse {
    match command {
        Command::SubmitReport { fields, attachments } => match submit_report(store, fields, attachments) {
            Ok(outcome) if outcome.is_complete() => AppResponse::json(&outcome),
            Ok(outcome) => match serde_json::to_string(&outcome) {
                Ok(json) => AppResponse::PartialFailure(json),
                Err(e) => AppResponse::from(e),
            },
            Err(e) => AppResponse::from(e),
        },
        Command::ValidateField { name, value } => match validation::validate_field(&name, &value) {
            Ok(()) => AppResponse::success(format!("Field '{name}' is valid")),
            Err(message) => AppResponse::ValidationError(message),
        },
        Command::Export { output_dir } => {
            if export::export_all(store, &output_dir) {
                AppResponse::success("Data exported successfully")
            } else {
                AppResponse::DatabaseError("Error exporting data".to_string())
            }
        }
        Command::Statistics => match analytics::get_statistics(store.config()) {
            Some(stats) => AppResponse::json(&stats),
            None => AppResponse::DatabaseError("Statistics unavailable".to_string()),
        },
        Command::ListReports => match store.get_all_reports() {
            Ok(reports) => AppResponse::json(&reports),
            Err(e) => AppResponse::from(e),
        },
        Command::ReportsByOperator { operator } => match store.get_reports_by_operator(&operator) {
            Ok(reports) => AppResponse::json(&reports),
            Err(e) => AppResponse::from(e),
        },
        Command::FilesForReport { report_id } => match store.get_files_by_report(report_id) {
            Ok(files) => AppResponse::json(&files),
            Err(e) => AppResponse::from(e),
        },
    }
}

/// Validates the form, stores the report, then stores each attachment in
/// order: coverage evidence first, then service-absence evidence, each in
/// submission order.
///
/// Once the report is stored it stays stored. Attachments that fail are
/// listed in the outcome instead of aborting the rest.
pub fn submit_report(
    store: &ReportDbState,
    fields: ReportFields,
    attachments: Vec<AttachmentRef>,
) -> Result<SubmissionOutcome, StoreError> {
    let mut blobs = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let blob = PathBlob::open(&attachment.path).map_err(|e| {
            StoreError::Validation(format!("Cannot read attachment {}: {e}", attachment.path.display()))
        })?;
        blobs.push((attachment.category, blob));
    }

    let summaries: Vec<AttachmentSummary> = blobs
        .iter()
        .map(|(category, blob)| AttachmentSummary::of(*category, blob))
        .collect();
    let errors = validation::validate_submission(&fields, &summaries);
    if !errors.is_empty() {
        let detail = serde_json::to_string(&errors)
            .map_err(|e| StoreError::Validation(format!("Invalid submission: {e}")))?;
        return Err(StoreError::Validation(detail));
    }

    let report_id = store.save_report(fields)?;

    let mut outcome = SubmissionOutcome {
        report_id,
        saved_files: Vec::new(),
        failed_files: Vec::new(),
    };

    for category in FileCategory::ALL {
        for (_, blob) in blobs.iter_mut().filter(|(c, _)| *c == category) {
            match store.save_file(&mut *blob, report_id, category) {
                Ok(id) => outcome.saved_files.push(SavedFile {
                    id,
                    file_name: blob.name().to_string(),
                    file_type: category,
                }),
                Err(e) => {
                    warn!("Report {report_id}: evidence not saved: {e}");
                    outcome.failed_files.push(FailedFile {
                        file_name: blob.name().to_string(),
                        file_type: category,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    info!(
        "Report {report_id} submitted with {} files ({} failed)",
        outcome.saved_files.len(),
        outcome.failed_files.len()
    );
    Ok(outcome)
}
