//! Record definitions for the report store.
//!
//! Two kinds of records live in the database: [`ReportRecord`], one fraud
//! complaint with free-form form fields, and [`FileRecord`], one evidence
//! attachment linked to a report by id. Both are serialized as JSON with the
//! field names the web form uses (`fechaCreacion`, `reportId`, ...), so an
//! export of the store is directly readable by the same front end.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Form fields of a report as submitted, before the store stamps it.
pub type ReportFields = Map<String, JsonValue>;

pub const FIELD_ID: &str = "id";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_CADASTRAL_REFERENCE: &str = "referenciaCatastral";
pub const FIELD_DECLARING_OPERATOR: &str = "operadorDeclarante";
pub const FIELD_CREATED_AT: &str = "fechaCreacion";
pub const FIELD_STATUS: &str = "estado";
pub const FIELD_CONTACTED_OPERATORS: &str = "operadoresConsultados";
pub const FIELD_CONTACT_METHODS: &str = "metodosContacto";

/// Status every report starts in.
pub const STATUS_PENDING: &str = "pendiente";

/// A stored fraud report.
///
/// `id`, `fechaCreacion` and `estado` are owned by the store; whatever the
/// caller put under those names is discarded on insert. Every other form
/// field is kept verbatim in `fields` and flattened back into the top-level
/// JSON object on serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: u64,

    #[serde(rename = "fechaCreacion")]
    pub fecha_creacion: String,

    pub estado: String,

    #[serde(flatten)]
    pub fields: ReportFields,
}

impl ReportRecord {
    /// Builds a record from submitted fields, dropping store-owned keys.
    pub fn stamp(id: u64, mut fields: ReportFields, created_at: String) -> Self {
        fields.remove(FIELD_ID);
        fields.remove(FIELD_CREATED_AT);
        fields.remove(FIELD_STATUS);

        Self {
            id,
            fecha_creacion: created_at,
            estado: STATUS_PENDING.to_string(),
            fields,
        }
    }

    /// String value of a field, `None` when absent or not a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        if name == FIELD_CREATED_AT {
            return Some(&self.fecha_creacion);
        }
        self.fields.get(name).and_then(JsonValue::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.field_str(FIELD_EMAIL)
    }

    pub fn declaring_operator(&self) -> Option<&str> {
        self.field_str(FIELD_DECLARING_OPERATOR)
    }
}

/// Evidence category, one per attachment slot of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    /// Coverage evidence.
    #[serde(rename = "cobertura")]
    Cobertura,
    /// Service-absence evidence.
    #[serde(rename = "faltaServicio")]
    FaltaServicio,
}

impl FileCategory {
    /// Slots in the order the form submits them.
    pub const ALL: [FileCategory; 2] = [FileCategory::Cobertura, FileCategory::FaltaServicio];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Cobertura => "cobertura",
            FileCategory::FaltaServicio => "faltaServicio",
        }
    }

    /// Name of the file input that feeds this category.
    pub fn form_slot(&self) -> &'static str {
        match self {
            FileCategory::Cobertura => "pruebasCobertura",
            FileCategory::FaltaServicio => "pruebasFaltaServicio",
        }
    }
}

impl Display for FileCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cobertura" => Ok(FileCategory::Cobertura),
            "faltaServicio" => Ok(FileCategory::FaltaServicio),
            other => Err(format!("Unknown file category: {other}")),
        }
    }
}

/// A stored evidence attachment.
///
/// `report_id` is not checked against the reports collection; a file may
/// point at a report that does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: u64,
    pub report_id: u64,
    pub file_name: String,
    pub file_type: FileCategory,
    pub mime_type: String,
    pub size: u64,
    /// Content as a `data:` URI.
    pub data: String,
    pub fecha_subida: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_discards_store_owned_fields() {
        let fields = json!({
            "id": 99,
            "email": "a@b.com",
            "estado": "resuelto",
            "fechaCreacion": "1999-01-01T00:00:00.000Z"
        });
        let fields = fields.as_object().cloned().unwrap();

        let record = ReportRecord::stamp(3, fields, "2024-05-01T10:00:00.000Z".to_string());

        assert_eq!(record.id, 3);
        assert_eq!(record.estado, STATUS_PENDING);
        assert_eq!(record.fecha_creacion, "2024-05-01T10:00:00.000Z");
        assert_eq!(record.email(), Some("a@b.com"));
        assert!(!record.fields.contains_key("id"));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], json!(3));
        assert_eq!(value["estado"], json!("pendiente"));
        assert_eq!(value["email"], json!("a@b.com"));
    }

    #[test]
    fn test_file_category_wire_names() {
        assert_eq!(serde_json::to_string(&FileCategory::Cobertura).unwrap(), "\"cobertura\"");
        assert_eq!("faltaServicio".parse::<FileCategory>(), Ok(FileCategory::FaltaServicio));
        assert!("otro".parse::<FileCategory>().is_err());
    }
}
