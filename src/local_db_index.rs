//! Secondary index encoding over LMDB sub-databases.
//!
//! Each index is its own sub-database. An entry key is the indexed value,
//! length-prefixed, followed by the big-endian id of the record it points at:
//!
//! ```text
//! [ u32 BE value length ][ value bytes ][ u64 BE record id ]
//! ```
//!
//! Keys sharing a value are therefore contiguous and ordered by record id,
//! so a lookup is a single cursor range scan that yields matches in
//! insertion order. Several records may share a value (indexes are never
//! unique).

use lmdb::{Cursor, Database, RwTransaction, Transaction, WriteFlags};
use lmdb_sys::MDB_SET_RANGE;
use serde::{Deserialize, Serialize};

use crate::local_db_model::{
    FIELD_CADASTRAL_REFERENCE, FIELD_CREATED_AT, FIELD_DECLARING_OPERATOR, FIELD_EMAIL,
};

/// LMDB's default maximum key size.
const MAX_KEY_SIZE: usize = 511;
const LEN_PREFIX: usize = 4;
const ID_SUFFIX: usize = 8;

/// Longest value that fits in an index key. Longer values are left out of
/// the index and looked up by scanning.
pub const MAX_INDEXED_VALUE_LEN: usize = MAX_KEY_SIZE - LEN_PREFIX - ID_SUFFIX;

/// Indexed attributes of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportIndex {
    Email,
    CadastralReference,
    DeclaringOperator,
    CreatedAt,
}

impl ReportIndex {
    pub const ALL: [ReportIndex; 4] = [
        ReportIndex::Email,
        ReportIndex::CadastralReference,
        ReportIndex::DeclaringOperator,
        ReportIndex::CreatedAt,
    ];

    /// Report field this index covers.
    pub fn field(&self) -> &'static str {
        match self {
            ReportIndex::Email => FIELD_EMAIL,
            ReportIndex::CadastralReference => FIELD_CADASTRAL_REFERENCE,
            ReportIndex::DeclaringOperator => FIELD_DECLARING_OPERATOR,
            ReportIndex::CreatedAt => FIELD_CREATED_AT,
        }
    }

    pub fn db_name(&self) -> &'static str {
        match self {
            ReportIndex::Email => "fraudReports.email",
            ReportIndex::CadastralReference => "fraudReports.referenciaCatastral",
            ReportIndex::DeclaringOperator => "fraudReports.operadorDeclarante",
            ReportIndex::CreatedAt => "fraudReports.fechaCreacion",
        }
    }
}

/// Primary key of a record.
pub fn record_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub fn decode_record_key(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

/// Scan prefix for every entry of `value`, `None` when the value is too
/// long to be indexed.
pub fn index_prefix(value: &[u8]) -> Option<Vec<u8>> {
    if value.len() > MAX_INDEXED_VALUE_LEN {
        return None;
    }
    let mut prefix = Vec::with_capacity(LEN_PREFIX + value.len() + ID_SUFFIX);
    prefix.extend_from_slice(&(value.len() as u32).to_be_bytes());
    prefix.extend_from_slice(value);
    Some(prefix)
}

pub fn index_key(value: &[u8], id: u64) -> Option<Vec<u8>> {
    let mut key = index_prefix(value)?;
    key.extend_from_slice(&record_key(id));
    Some(key)
}

/// Adds one entry inside the caller's write transaction.
///
/// Returns `false` without writing when the value cannot be indexed.
pub fn put_index_entry(
    txn: &mut RwTransaction,
    db: Database,
    value: &[u8],
    id: u64,
) -> Result<bool, lmdb::Error> {
    let key = match index_key(value, id) {
        Some(key) => key,
        None => return Ok(false),
    };
    txn.put(db, &key, &record_key(id), WriteFlags::empty())?;
    Ok(true)
}

/// Ids of every record indexed under `prefix`, in ascending order.
///
/// The cursor is positioned with `MDB_SET_RANGE`; a prefix that sorts after
/// every key yields no ids.
pub fn scan_index<T: Transaction>(txn: &T, db: Database, prefix: &[u8]) -> Result<Vec<u64>, lmdb::Error> {
    let mut cursor = txn.open_ro_cursor(db)?;
    let first = match cursor.get(Some(prefix), None, MDB_SET_RANGE) {
        Ok((key, _)) => key.unwrap_or(prefix),
        Err(lmdb::Error::NotFound) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut ids = Vec::new();
    if !push_matching(&mut ids, first, prefix) {
        return Ok(ids);
    }
    for (key, _) in cursor.iter() {
        if !push_matching(&mut ids, key, prefix) {
            break;
        }
    }

    Ok(ids)
}

/// Records the id in `key` if it belongs to `prefix`. `false` once the scan
/// has left the prefix.
fn push_matching(ids: &mut Vec<u64>, key: &[u8], prefix: &[u8]) -> bool {
    if !key.starts_with(prefix) {
        return false;
    }
    if let Some(id) = decode_record_key(&key[prefix.len()..]) {
        ids.push(id);
    }
    true
}
