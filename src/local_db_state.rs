//! The report store.
//!
//! [`ReportDbState`] is an explicitly owned handle on one LMDB environment.
//! Every operation runs in its own transaction scoped to the collections it
//! touches: reads use a read-only transaction, each insert a single write
//! transaction that assigns the id, writes the record and all its index
//! entries, and commits. An insert either lands completely or not at all.
//!
//! There is no transaction spanning a report and its files. Callers that
//! save a report and then its evidence must handle the case where the report
//! is stored and some files are not.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use lmdb::{Cursor, Database, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::evidence_blob::{encode_data_uri, EvidenceBlob};
use crate::local_db_index::{
    decode_record_key, index_prefix, put_index_entry, record_key, scan_index, ReportIndex,
};
use crate::local_db_model::{FileCategory, FileRecord, ReportFields, ReportRecord};
use crate::local_db_schema::{
    bootstrap, category_key, next_sequence, shared_environment, Schema, FILES_SEQUENCE_KEY,
    REPORTS_SEQUENCE_KEY,
};

pub struct ReportDbState {
    env: Arc<Environment>,
    schema: Schema,
    config: StoreConfig,
}

/// Current time as stored on records, e.g. `2024-01-15T10:30:00.000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ReportDbState {
    /// Opens (creating if absent) the database described by `config`.
    ///
    /// The schema is created or upgraded before this returns, so a handle
    /// that exists is always fully initialized.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate().map_err(|e| StoreError::Open(e.to_string()))?;

        let env = shared_environment(&config)?;
        let schema = bootstrap(&env, config.version)?;

        info!("Database '{}' opened successfully (schema v{})", config.name, config.version);
        Ok(Self { env, schema, config })
    }

    /// Opens `<name>.lmdb` in the working directory with default settings.
    pub fn init(name: impl Into<String>) -> Result<Self, StoreError> {
        Self::open(StoreConfig::new(name))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Stamps and inserts a report, returning its new id.
    ///
    /// `fechaCreacion` is set to now and `estado` to pending; caller values
    /// for `id`, `fechaCreacion` and `estado` are discarded.
    pub fn save_report(&self, fields: ReportFields) -> Result<u64, StoreError> {
        let created_at = now_timestamp();

        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| StoreError::write("Cannot begin report transaction", e))?;

        let id = next_sequence(&mut txn, self.schema.meta, REPORTS_SEQUENCE_KEY)
            .map_err(|e| StoreError::write("Cannot assign report id", e))?;
        let record = ReportRecord::stamp(id, fields, created_at);

        let json = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Write(format!("Cannot encode report: {e}")))?;
        txn.put(self.schema.reports, &record_key(id), &json, WriteFlags::NO_OVERWRITE)
            .map_err(|e| StoreError::write("Error saving report", e))?;

        for index in ReportIndex::ALL {
            let value = match record.field_str(index.field()) {
                Some(value) => value,
                None => continue,
            };
            let indexed = put_index_entry(&mut txn, self.schema.report_index(index), value.as_bytes(), id)
                .map_err(|e| StoreError::write("Error indexing report", e))?;
            if !indexed {
                warn!("Report {id}: value of '{}' too long to index", index.field());
            }
        }

        txn.commit()
            .map_err(|e| StoreError::write("Error committing report", e))?;

        info!("Report saved with ID: {id}");
        Ok(id)
    }

    /// Reads `blob`, encodes it and inserts a file record linked to
    /// `report_id`.
    ///
    /// The blob is read before the write transaction starts. A read failure
    /// is a [`StoreError::Read`]; nothing is written in that case.
    /// `report_id` is not checked against the reports collection.
    pub fn save_file<B>(&self, blob: &mut B, report_id: u64, category: FileCategory) -> Result<u64, StoreError>
    where
        B: EvidenceBlob + ?Sized,
    {
        let bytes = blob
            .read_all()
            .map_err(|e| StoreError::Read(format!("Error reading file '{}': {e}", blob.name())))?;
        let data = encode_data_uri(blob.mime_type(), &bytes);
        let uploaded_at = now_timestamp();

        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| StoreError::write("Cannot begin file transaction", e))?;

        let id = next_sequence(&mut txn, self.schema.meta, FILES_SEQUENCE_KEY)
            .map_err(|e| StoreError::write("Cannot assign file id", e))?;

        let record = FileRecord {
            id,
            report_id,
            file_name: blob.name().to_string(),
            file_type: category,
            mime_type: blob.mime_type().to_string(),
            size: blob.size(),
            data,
            fecha_subida: uploaded_at,
        };

        let json = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Write(format!("Cannot encode file record: {e}")))?;
        txn.put(self.schema.files, &record_key(id), &json, WriteFlags::NO_OVERWRITE)
            .map_err(|e| StoreError::write("Error saving file", e))?;
        put_index_entry(&mut txn, self.schema.files_by_report, &record_key(report_id), id)
            .map_err(|e| StoreError::write("Error indexing file by report", e))?;
        put_index_entry(&mut txn, self.schema.files_by_type, category_key(category), id)
            .map_err(|e| StoreError::write("Error indexing file by type", e))?;

        txn.commit()
            .map_err(|e| StoreError::write("Error committing file", e))?;

        info!("File saved with ID: {id} (report {report_id}, {category})");
        Ok(id)
    }

    /// Every report in insertion order.
    pub fn get_all_reports(&self) -> Result<Vec<ReportRecord>, StoreError> {
        self.read_all(self.schema.reports, "reports")
    }

    pub fn get_report_by_id(&self, id: u64) -> Result<Option<ReportRecord>, StoreError> {
        self.read_one(self.schema.reports, id)
    }

    /// Reports whose `operadorDeclarante` equals `operator`, in insertion
    /// order. Empty when nothing matches.
    pub fn get_reports_by_operator(&self, operator: &str) -> Result<Vec<ReportRecord>, StoreError> {
        self.get_reports_by_index(ReportIndex::DeclaringOperator, operator)
    }

    pub fn get_reports_by_index(&self, index: ReportIndex, value: &str) -> Result<Vec<ReportRecord>, StoreError> {
        let prefix = match index_prefix(value.as_bytes()) {
            Some(prefix) => prefix,
            None => {
                debug!("Value for '{}' exceeds index key size, scanning", index.field());
                let reports = self.get_all_reports()?;
                return Ok(reports
                    .into_iter()
                    .filter(|r| r.field_str(index.field()) == Some(value))
                    .collect());
            }
        };

        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::read("Cannot begin read", e))?;
        let ids = scan_index(&txn, self.schema.report_index(index), &prefix)
            .map_err(|e| StoreError::read(&format!("Cannot scan index '{}'", index.field()), e))?;

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            match txn.get(self.schema.reports, &record_key(id)) {
                Ok(bytes) => reports.push(decode::<ReportRecord>(bytes, id)?),
                Err(lmdb::Error::NotFound) => warn!("Index '{}' points at missing report {id}", index.field()),
                Err(e) => return Err(StoreError::read("Cannot read report", e)),
            }
        }

        debug!("Index '{}' lookup returned {} reports", index.field(), reports.len());
        Ok(reports)
    }

    pub fn count_reports(&self) -> Result<usize, StoreError> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::read("Cannot begin read", e))?;
        let mut cursor = txn
            .open_ro_cursor(self.schema.reports)
            .map_err(|e| StoreError::read("Cannot open reports cursor", e))?;
        let count = cursor.iter().count();
        Ok(count)
    }

    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.read_all(self.schema.files, "files")
    }

    /// Files linked to `report_id`, in upload order.
    pub fn get_files_by_report(&self, report_id: u64) -> Result<Vec<FileRecord>, StoreError> {
        self.read_indexed_files(self.schema.files_by_report, &record_key(report_id))
    }

    pub fn get_files_by_category(&self, category: FileCategory) -> Result<Vec<FileRecord>, StoreError> {
        self.read_indexed_files(self.schema.files_by_type, category_key(category))
    }

    /// Releases this handle. The environment stays open while other handles
    /// on the same path are alive.
    pub fn close(self) {
        info!("Closing handle on database '{}'", self.config.name);
    }

    fn read_all<T>(&self, db: Database, what: &str) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::read("Cannot begin read", e))?;
        let mut cursor = txn
            .open_ro_cursor(db)
            .map_err(|e| StoreError::read(&format!("Cannot open {what} cursor"), e))?;

        let mut records = Vec::new();
        for (key, value) in cursor.iter() {
            let id = decode_record_key(key).unwrap_or_default();
            records.push(decode::<T>(value, id)?);
        }

        debug!("Read {} {what}", records.len());
        Ok(records)
    }

    fn read_one<T>(&self, db: Database, id: u64) -> Result<Option<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::read("Cannot begin read", e))?;

        match txn.get(db, &record_key(id)) {
            Ok(bytes) => Ok(Some(decode::<T>(bytes, id)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(StoreError::read("Cannot read record", e)),
        }
    }

    fn read_indexed_files(&self, index_db: Database, value: &[u8]) -> Result<Vec<FileRecord>, StoreError> {
        let prefix = index_prefix(value)
            .ok_or_else(|| StoreError::Read("Index value too long".to_string()))?;

        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::read("Cannot begin read", e))?;
        let ids = scan_index(&txn, index_db, &prefix)
            .map_err(|e| StoreError::read("Cannot scan file index", e))?;

        let mut files = Vec::with_capacity(ids.len());
        for id in ids {
            match txn.get(self.schema.files, &record_key(id)) {
                Ok(bytes) => files.push(decode::<FileRecord>(bytes, id)?),
                Err(lmdb::Error::NotFound) => warn!("File index points at missing file {id}"),
                Err(e) => return Err(StoreError::read("Cannot read file", e)),
            }
        }
        Ok(files)
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], id: u64) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Read(format!("Record {id} is not valid JSON: {e}")))
}

impl std::fmt::Debug for ReportDbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportDbState")
            .field("path", &self.config.db_path())
            .field("version", &self.config.version)
            .finish()
    }
}
