//! JSON backup of the report collection.
//!
//! Only report records are exported. Evidence files stay in the store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use log::{info, warn};

use crate::error::StoreError;
use crate::local_db_state::ReportDbState;

pub const EXPORT_FILE_PREFIX: &str = "fraude_unico_datos";
pub const EXPORT_MIME_TYPE: &str = "application/json";

/// A ready-to-save download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub content: String,
}

impl ExportArtifact {
    /// Writes the artifact into `dir` under its file name.
    pub fn save_to(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, self.content.as_bytes())?;
        Ok(path)
    }
}

/// `fraude_unico_datos_<YYYY-MM-DD>.json`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("{EXPORT_FILE_PREFIX}_{}.json", date.format("%Y-%m-%d"))
}

/// Reads every report and renders it as an indented JSON array.
pub fn export_snapshot(store: &ReportDbState) -> Result<ExportArtifact, StoreError> {
    let reports = store.get_all_reports()?;
    let content = serde_json::to_string_pretty(&reports)
        .map_err(|e| StoreError::Read(format!("Cannot serialize reports: {e}")))?;

    Ok(ExportArtifact {
        file_name: export_file_name(Utc::now().date_naive()),
        mime_type: EXPORT_MIME_TYPE,
        content,
    })
}

/// Exports every report into `output_dir`. Returns `false` on any failure,
/// which is logged.
pub fn export_all(store: &ReportDbState, output_dir: &Path) -> bool {
    let artifact = match export_snapshot(store) {
        Ok(artifact) => artifact,
        Err(e) => {
            warn!("Error exporting data: {e}");
            return false;
        }
    };

    match artifact.save_to(output_dir) {
        Ok(path) => {
            info!("Exported reports to {}", path.display());
            true
        }
        Err(e) => {
            warn!("Error exporting data to {}: {e}", output_dir.display());
            false
        }
    }
}
