//! Environment sharing and schema bootstrap.
//!
//! LMDB must not open the same environment twice inside one process, yet the
//! form handler, the exporter and the analytics query each want their own
//! handle. Environments are therefore kept in a process-wide registry of weak
//! references keyed by canonical path: a second handle on the same path
//! reuses the live environment, and the environment closes once the last
//! handle drops.
//!
//! The schema is versioned. The stored version lives in the `meta`
//! sub-database together with the per-collection id sequences.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use lazy_static::lazy_static;
use lmdb::{Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use log::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::local_db_index::ReportIndex;
use crate::local_db_model::FileCategory;

pub const META_DB: &str = "meta";
pub const REPORTS_DB: &str = "fraudReports";
pub const FILES_DB: &str = "fraudFiles";
pub const FILES_BY_REPORT_DB: &str = "fraudFiles.reportId";
pub const FILES_BY_TYPE_DB: &str = "fraudFiles.fileType";

pub const REPORTS_SEQUENCE_KEY: &[u8] = b"seq:fraudReports";
pub const FILES_SEQUENCE_KEY: &[u8] = b"seq:fraudFiles";
const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

const MAX_DBS: u32 = 16;

lazy_static! {
    static ref ENVIRONMENTS: Mutex<HashMap<PathBuf, Weak<Environment>>> = Mutex::new(HashMap::new());
}

/// Opened sub-databases of one environment.
#[derive(Clone, Copy)]
pub struct Schema {
    pub meta: Database,
    pub reports: Database,
    pub files: Database,
    pub reports_by_email: Database,
    pub reports_by_cadastral_reference: Database,
    pub reports_by_operator: Database,
    pub reports_by_created_at: Database,
    pub files_by_report: Database,
    pub files_by_type: Database,
}

impl Schema {
    pub fn report_index(&self, index: ReportIndex) -> Database {
        match index {
            ReportIndex::Email => self.reports_by_email,
            ReportIndex::CadastralReference => self.reports_by_cadastral_reference,
            ReportIndex::DeclaringOperator => self.reports_by_operator,
            ReportIndex::CreatedAt => self.reports_by_created_at,
        }
    }
}

/// Returns the live environment for `config`'s path, opening it if needed.
///
/// `map_size` only applies to the handle that actually opens the
/// environment.
pub fn shared_environment(config: &StoreConfig) -> Result<Arc<Environment>, StoreError> {
    let path = config.db_path();

    std::fs::create_dir_all(&path)
        .map_err(|e| StoreError::Open(format!("Cannot create database directory {}: {e}", path.display())))?;
    let key = path
        .canonicalize()
        .map_err(|e| StoreError::Open(format!("Cannot resolve database path {}: {e}", path.display())))?;

    let mut registry = ENVIRONMENTS
        .lock()
        .map_err(|_| StoreError::Open("Environment registry lock poisoned".to_string()))?;

    if let Some(env) = registry.get(&key).and_then(Weak::upgrade) {
        debug!("Reusing open environment at {}", key.display());
        return Ok(env);
    }

    info!("Opening LMDB environment at {}", key.display());
    let env = Environment::new()
        .set_max_dbs(MAX_DBS)
        .set_map_size(config.map_size)
        .open(&key)
        .map_err(|e| StoreError::open(&format!("Cannot open environment {}", key.display()), e))?;

    let env = Arc::new(env);
    registry.retain(|_, handle| handle.strong_count() > 0);
    registry.insert(key, Arc::downgrade(&env));
    Ok(env)
}

/// Brings the schema up to `version` and opens every collection.
///
/// Absent or older stored version: all collections and indexes are created
/// (existing data is kept) and the new version recorded. Same version: the
/// collections are opened as they are. Newer stored version: refused.
pub fn bootstrap(env: &Environment, version: u32) -> Result<Schema, StoreError> {
    let meta = match env.open_db(Some(META_DB)) {
        Ok(db) => db,
        Err(lmdb::Error::NotFound) => env
            .create_db(Some(META_DB), DatabaseFlags::empty())
            .map_err(|e| StoreError::open("Cannot create meta collection", e))?,
        Err(e) => return Err(StoreError::open("Cannot open meta collection", e)),
    };

    match read_schema_version(env, meta)? {
        Some(stored) if stored > version => Err(StoreError::Open(format!(
            "Stored schema version {stored} is newer than requested version {version}"
        ))),
        Some(stored) if stored == version => {
            debug!("Schema at version {stored}, opening collections");
            open_collections(env, meta)
        }
        stored => {
            info!("Upgrading schema from {:?} to version {version}", stored);
            let schema = create_collections(env, meta)?;
            write_schema_version(env, meta, version)?;
            info!("Database structure created");
            Ok(schema)
        }
    }
}

pub fn read_schema_version(env: &Environment, meta: Database) -> Result<Option<u32>, StoreError> {
    let txn = env
        .begin_ro_txn()
        .map_err(|e| StoreError::open("Cannot begin schema read", e))?;

    let version = match txn.get(meta, &SCHEMA_VERSION_KEY) {
        Ok(bytes) => {
            let raw: [u8; 4] = bytes
                .try_into()
                .map_err(|_| StoreError::Open("Corrupted schema version entry".to_string()))?;
            Some(u32::from_be_bytes(raw))
        }
        Err(lmdb::Error::NotFound) => None,
        Err(e) => return Err(StoreError::open("Cannot read schema version", e)),
    };

    Ok(version)
}

fn write_schema_version(env: &Environment, meta: Database, version: u32) -> Result<(), StoreError> {
    let mut txn = env
        .begin_rw_txn()
        .map_err(|e| StoreError::open("Cannot begin schema write", e))?;
    txn.put(meta, &SCHEMA_VERSION_KEY, &version.to_be_bytes(), WriteFlags::empty())
        .map_err(|e| StoreError::open("Cannot record schema version", e))?;
    txn.commit()
        .map_err(|e| StoreError::open("Cannot commit schema version", e))
}

fn create_collections(env: &Environment, meta: Database) -> Result<Schema, StoreError> {
    let create = |name: &str| {
        env.create_db(Some(name), DatabaseFlags::empty())
            .map_err(|e| StoreError::open(&format!("Cannot create collection '{name}'"), e))
    };

    Ok(Schema {
        meta,
        reports: create(REPORTS_DB)?,
        files: create(FILES_DB)?,
        reports_by_email: create(ReportIndex::Email.db_name())?,
        reports_by_cadastral_reference: create(ReportIndex::CadastralReference.db_name())?,
        reports_by_operator: create(ReportIndex::DeclaringOperator.db_name())?,
        reports_by_created_at: create(ReportIndex::CreatedAt.db_name())?,
        files_by_report: create(FILES_BY_REPORT_DB)?,
        files_by_type: create(FILES_BY_TYPE_DB)?,
    })
}

fn open_collections(env: &Environment, meta: Database) -> Result<Schema, StoreError> {
    let open = |name: &str| {
        env.open_db(Some(name))
            .map_err(|e| StoreError::open(&format!("Missing collection '{name}'"), e))
    };

    Ok(Schema {
        meta,
        reports: open(REPORTS_DB)?,
        files: open(FILES_DB)?,
        reports_by_email: open(ReportIndex::Email.db_name())?,
        reports_by_cadastral_reference: open(ReportIndex::CadastralReference.db_name())?,
        reports_by_operator: open(ReportIndex::DeclaringOperator.db_name())?,
        reports_by_created_at: open(ReportIndex::CreatedAt.db_name())?,
        files_by_report: open(FILES_BY_REPORT_DB)?,
        files_by_type: open(FILES_BY_TYPE_DB)?,
    })
}

/// Bumps and returns the sequence stored under `key`. First value is 1.
pub fn next_sequence(txn: &mut RwTransaction, meta: Database, key: &[u8]) -> Result<u64, lmdb::Error> {
    let current = match txn.get(meta, &key) {
        Ok(bytes) => match <[u8; 8]>::try_from(bytes) {
            Ok(raw) => u64::from_be_bytes(raw),
            Err(_) => return Err(lmdb::Error::Corrupted),
        },
        Err(lmdb::Error::NotFound) => 0,
        Err(e) => return Err(e),
    };

    let next = current + 1;
    txn.put(meta, &key, &next.to_be_bytes(), WriteFlags::empty())?;
    Ok(next)
}

/// Index key value for a file's category.
pub fn category_key(category: FileCategory) -> &'static [u8] {
    category.as_str().as_bytes()
}
