//! # Fraud Report Core
//!
//! Local storage core for broadband fraud reports. A report submitted from
//! the complaint form is stored together with its evidence files in an
//! embedded LMDB database; nothing leaves the device. On top of the store sit
//! a JSON backup export and a small set of descriptive statistics.
//!
//! ## Modules
//!
//! - [`local_db_state`]: the store handle ([`ReportDbState`]) and its
//!   operations
//! - [`local_db_schema`] / [`local_db_index`]: schema bootstrap, shared
//!   environments, secondary indexes
//! - [`local_db_model`]: report and file records
//! - [`evidence_blob`]: attachments as readable blobs, `data:` URI encoding
//! - [`export`]: JSON snapshot of all reports
//! - [`analytics`]: counts by operator and month
//! - [`validation`]: form rules applied before submission
//! - [`command`]: command dispatch for front ends
//!
//! ## Quick Start
//!
//! ```no_run
//! use fraud_report_core::config::StoreConfig;
//! use fraud_report_core::local_db_state::ReportDbState;
//! use serde_json::json;
//!
//! let store = ReportDbState::open(StoreConfig::new("denuncias"))?;
//!
//! let fields = json!({"email": "a@b.com", "operadorDeclarante": "OpCo"});
//! let id = store.save_report(fields.as_object().cloned().unwrap_or_default())?;
//!
//! let same_operator = store.get_reports_by_operator("OpCo")?;
//! assert!(same_operator.iter().any(|r| r.id == id));
//! # Ok::<(), fraud_report_core::error::StoreError>(())
//! ```
//!
//! ## FFI Functions
//!
//! Every function below takes and returns NUL-terminated UTF-8 strings. The
//! returned string is a JSON [`AppResponse`](app_response::AppResponse)
//! envelope and must be released with [`free_response`].
//!
//! - [`create_db`] / [`create_db_with_config`] - Open a store handle
//! - [`save_report`] - Insert a report
//! - [`save_file`] - Insert an evidence file linked to a report
//! - [`get_all_reports`] - Retrieve all reports
//! - [`get_reports_by_operator`] - Reports by declaring operator
//! - [`get_files_by_report`] - Evidence files of one report
//! - [`export_all_reports`] - Write the JSON backup into a directory
//! - [`get_statistics`] - Aggregates over all reports
//! - [`dispatch_command`] - Run a JSON-encoded [`Command`](command::Command)
//! - [`close_database`] - Release a handle

pub mod analytics;
pub mod app_response;
pub mod command;
pub mod config;
pub mod error;
pub mod evidence_blob;
pub mod export;
pub mod local_db_index;
pub mod local_db_model;
pub mod local_db_schema;
pub mod local_db_state;
pub mod validation;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::app_response::AppResponse;
use crate::command::Command;
use crate::config::StoreConfig;
use crate::evidence_blob::PathBlob;
use crate::local_db_model::{FileCategory, ReportFields};
use crate::local_db_state::ReportDbState;

/// Opens (creating if absent) `<name>.lmdb` in the working directory.
///
/// # Parameters
///
/// * `name` - Null-terminated C string with the database name
///
/// # Returns
///
/// An owned [`ReportDbState`] handle, or null when `name` is null, not
/// UTF-8, or the store cannot be opened. Release it with [`close_database`].
///
/// # Safety
///
/// `name` must be null or point to a valid NUL-terminated string.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use fraud_report_core::create_db;
///
/// let name = CString::new("denuncias").unwrap();
/// let db_state = create_db(name.as_ptr());
/// assert!(!db_state.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_db(name: *const c_char) -> *mut ReportDbState {
    if name.is_null() {
        warn!("Null name pointer passed to create_db");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    open_handle(StoreConfig::new(name_str))
}

/// Opens a store from a JSON [`StoreConfig`]. Missing fields take their
/// defaults.
///
/// # Parameters
///
/// * `config_json` - Null-terminated JSON, e.g.
///   `{"name": "denuncias", "directory": "/data"}`
///
/// # Returns
///
/// An owned handle, or null on failure. Release it with [`close_database`].
///
/// # Safety
///
/// `config_json` must be null or point to a valid NUL-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_db_with_config(config_json: *const c_char) -> *mut ReportDbState {
    if config_json.is_null() {
        warn!("Null config pointer passed to create_db_with_config");
        return std::ptr::null_mut();
    }

    let json = match unsafe { CStr::from_ptr(config_json).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in config parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match StoreConfig::from_json(json) {
        Ok(config) => open_handle(config),
        Err(e) => {
            warn!("Rejected store configuration: {e}");
            std::ptr::null_mut()
        }
    }
}

fn open_handle(config: StoreConfig) -> *mut ReportDbState {
    let path = config.db_path();
    match ReportDbState::open(config) {
        Ok(state) => {
            info!("✅ Database initialized at {}", path.display());
            Box::into_raw(Box::new(state))
        }
        Err(e) => {
            warn!("❌ Failed to initialize database at {}: {e}", path.display());
            std::ptr::null_mut()
        }
    }
}

/// Inserts a report given as a JSON object of form fields.
///
/// # Parameters
///
/// * `state` - Handle returned by [`create_db`] or [`create_db_with_config`]
/// * `json_ptr` - Null-terminated JSON object with the form fields
///
/// # Returns
///
/// A JSON [`AppResponse`](app_response::AppResponse): `Ok` with
/// `{"id": <new id>}`, `SerializationError` for malformed JSON, `BadRequest`
/// for null pointers. The string must be released with [`free_response`].
///
/// # Safety
///
/// `state` must be null or a live handle not yet passed to
/// [`close_database`]. `json_ptr` must be null or point to a valid
/// NUL-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_report(state: *mut ReportDbState, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "save_report") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let fields: ReportFields = match serde_json::from_str(&json_str) {
        Ok(fields) => fields,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    match state.save_report(fields) {
        Ok(id) => response_to_c_string(&AppResponse::json(&json!({ "id": id }))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveFileRequest {
    path: String,
    report_id: u64,
    file_type: FileCategory,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Reads a file from disk and stores it linked to a report.
///
/// # Parameters
///
/// * `state` - Live store handle
/// * `json_ptr` - Request `{"path": "...", "reportId": 1, "fileType": "cobertura"}`
///   with an optional `mimeType` overriding the one guessed from the extension
///
/// # Returns
///
/// `Ok` with `{"id": <new id>}`, or an error envelope. Free it with
/// [`free_response`].
///
/// # Safety
///
/// `state` must be null or a live handle. `json_ptr` must be null or point to
/// a valid NUL-terminated string. The file at `path` is only read.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_file(state: *mut ReportDbState, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "save_file") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let request: SaveFileRequest = match serde_json::from_str(&json_str) {
        Ok(request) => request,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let mut blob = match PathBlob::open(&request.path) {
        Ok(blob) => blob,
        Err(e) => {
            let error = AppResponse::DatabaseError(format!("Error reading file '{}': {e}", request.path));
            return response_to_c_string(&error);
        }
    };
    if let Some(mime_type) = request.mime_type {
        blob = blob.with_mime_type(mime_type);
    }

    match state.save_file(&mut blob, request.report_id, request.file_type) {
        Ok(id) => response_to_c_string(&AppResponse::json(&json!({ "id": id }))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Responds `Ok` with a JSON array of every report (`[]` when empty).
///
/// # Safety
///
/// `state` must be null or a live handle.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all_reports(state: *mut ReportDbState) -> *const c_char {
    let state = match state_ref(state, "get_all_reports") {
        Ok(state) => state,
        Err(err) => return err,
    };

    match state.get_all_reports() {
        Ok(reports) => response_to_c_string(&AppResponse::json(&reports)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Responds `Ok` with the reports whose declaring operator equals
/// `operator` (possibly an empty array).
///
/// # Safety
///
/// `state` must be null or a live handle; `operator` null or a valid
/// NUL-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_reports_by_operator(state: *mut ReportDbState, operator: *const c_char) -> *const c_char {
    let state = match state_ref(state, "get_reports_by_operator") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let operator = match c_ptr_to_string(operator, "operator") {
        Ok(operator) => operator,
        Err(err) => return err,
    };

    match state.get_reports_by_operator(&operator) {
        Ok(reports) => response_to_c_string(&AppResponse::json(&reports)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Responds `Ok` with the evidence files linked to `report_id`.
///
/// # Safety
///
/// `state` must be null or a live handle.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_files_by_report(state: *mut ReportDbState, report_id: u64) -> *const c_char {
    let state = match state_ref(state, "get_files_by_report") {
        Ok(state) => state,
        Err(err) => return err,
    };

    match state.get_files_by_report(report_id) {
        Ok(files) => response_to_c_string(&AppResponse::json(&files)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Writes `fraude_unico_datos_<date>.json` into `dir_ptr`, creating the
/// directory if needed.
///
/// # Returns
///
/// `Ok` on success, `DatabaseError` when the export could not be written.
///
/// # Safety
///
/// `state` must be null or a live handle; `dir_ptr` null or a valid
/// NUL-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn export_all_reports(state: *mut ReportDbState, dir_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "export_all_reports") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let dir = match c_ptr_to_string(dir_ptr, "directory") {
        Ok(dir) => dir,
        Err(err) => return err,
    };

    if export::export_all(state, Path::new(&dir)) {
        response_to_c_string(&AppResponse::success("Data exported successfully"))
    } else {
        response_to_c_string(&AppResponse::DatabaseError("Error exporting data".to_string()))
    }
}

/// Responds `Ok` with the statistics object. Computed on a separate handle
/// opened from this handle's configuration.
///
/// # Safety
///
/// `state` must be null or a live handle.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_statistics(state: *mut ReportDbState) -> *const c_char {
    let state = match state_ref(state, "get_statistics") {
        Ok(state) => state,
        Err(err) => return err,
    };

    match analytics::get_statistics(state.config()) {
        Some(stats) => response_to_c_string(&AppResponse::json(&stats)),
        None => response_to_c_string(&AppResponse::DatabaseError("Statistics unavailable".to_string())),
    }
}

/// Runs a JSON-encoded [`Command`], e.g. `{"command": "listReports"}`.
///
/// # Returns
///
/// The envelope produced by [`command::dispatch`]; an unknown or malformed
/// command is a `SerializationError`.
///
/// # Safety
///
/// `state` must be null or a live handle; `json_ptr` null or a valid
/// NUL-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn dispatch_command(state: *mut ReportDbState, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "dispatch_command") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let command: Command = match serde_json::from_str(&json_str) {
        Ok(command) => command,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid command: {e}"));
            return response_to_c_string(&error);
        }
    };

    response_to_c_string(&command::dispatch(state, command))
}

/// Releases a handle returned by [`create_db`] or [`create_db_with_config`].
///
/// # Returns
///
/// `Ok` once released, `BadRequest` for a null pointer.
///
/// # Safety
///
/// Takes ownership of `db_state`. It must come from this library and must
/// not be used or closed again afterwards. Other handles on the same
/// database stay valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_database(db_state: *mut ReportDbState) -> *const c_char {
    if db_state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_database".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { Box::from_raw(db_state) };
    state.close();
    response_to_c_string(&AppResponse::success("Database connection closed successfully"))
}

/// Frees a string returned by any function of this library.
///
/// # Safety
///
/// `ptr` must be null or a string returned by this library that has not
/// been freed yet. Strings from elsewhere must not be passed here.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr as *mut c_char));
    }
}

fn state_ref<'a>(state: *mut ReportDbState, fn_name: &str) -> Result<&'a ReportDbState, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(state) => Ok(state),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {fn_name}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Serializes `response` into a newly allocated C string, null if that
/// fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to an owned `String`, or an error response
/// for null pointers and invalid UTF-8.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
