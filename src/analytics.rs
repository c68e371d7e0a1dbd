//! Descriptive aggregates over stored reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::StoreConfig;
use crate::local_db_model::{ReportRecord, FIELD_DECLARING_OPERATOR};
use crate::local_db_state::ReportDbState;

pub const UNKNOWN_OPERATOR: &str = "Unknown";

/// Reports carry no resolution timestamp yet, so the average cannot be
/// computed.
pub const RESPONSE_TIME_PENDING: &str = "Pendiente de implementación";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_reports: usize,
    pub operator_breakdown: BTreeMap<String, usize>,
    pub monthly_trends: BTreeMap<String, usize>,
    pub average_response_time: String,
}

/// Opens a dedicated handle from `config` and aggregates every report.
///
/// Returns `None` when the store cannot be opened or read; the cause is
/// logged.
pub fn get_statistics(config: &StoreConfig) -> Option<Statistics> {
    let store = match ReportDbState::open(config.clone()) {
        Ok(store) => store,
        Err(e) => {
            warn!("Statistics unavailable, cannot open store: {e}");
            return None;
        }
    };

    match store.get_all_reports() {
        Ok(reports) => Some(compute_statistics(&reports)),
        Err(e) => {
            warn!("Statistics unavailable, cannot read reports: {e}");
            None
        }
    }
}

pub fn compute_statistics(reports: &[ReportRecord]) -> Statistics {
    Statistics {
        total_reports: reports.len(),
        operator_breakdown: operator_breakdown(reports),
        monthly_trends: monthly_trends(reports),
        average_response_time: RESPONSE_TIME_PENDING.to_string(),
    }
}

pub fn operator_breakdown(reports: &[ReportRecord]) -> BTreeMap<String, usize> {
    let mut breakdown = BTreeMap::new();
    for report in reports {
        *breakdown.entry(operator_key(report)).or_insert(0) += 1;
    }
    breakdown
}

/// Counts per `YYYY-MM` of the creation timestamp (UTC).
pub fn monthly_trends(reports: &[ReportRecord]) -> BTreeMap<String, usize> {
    let mut trends = BTreeMap::new();
    for report in reports {
        match DateTime::parse_from_rfc3339(&report.fecha_creacion) {
            Ok(created) => {
                let month = created.with_timezone(&Utc).format("%Y-%m").to_string();
                *trends.entry(month).or_insert(0) += 1;
            }
            Err(e) => warn!(
                "Report {} has unparsable fechaCreacion '{}': {e}",
                report.id, report.fecha_creacion
            ),
        }
    }
    trends
}

fn operator_key(report: &ReportRecord) -> String {
    match report.fields.get(FIELD_DECLARING_OPERATOR) {
        Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => UNKNOWN_OPERATOR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(id: u64, operator: JsonValue, created: &str) -> ReportRecord {
        let mut fields = serde_json::Map::new();
        if !operator.is_null() {
            fields.insert(FIELD_DECLARING_OPERATOR.to_string(), operator);
        }
        ReportRecord::stamp(id, fields, created.to_string())
    }

    #[test]
    fn test_operator_breakdown_with_unknown() {
        let reports = vec![
            report(1, json!("A"), "2024-01-10T09:00:00.000Z"),
            report(2, json!("A"), "2024-01-11T09:00:00.000Z"),
            report(3, json!("B"), "2024-02-01T09:00:00.000Z"),
            report(4, JsonValue::Null, "2024-02-02T09:00:00.000Z"),
        ];

        let breakdown = operator_breakdown(&reports);
        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown["A"], 2);
        assert_eq!(breakdown["B"], 1);
        assert_eq!(breakdown[UNKNOWN_OPERATOR], 1);
    }

    #[test]
    fn test_empty_operator_counts_as_unknown() {
        let reports = vec![report(1, json!(""), "2024-01-10T09:00:00.000Z")];
        assert_eq!(operator_breakdown(&reports)[UNKNOWN_OPERATOR], 1);
    }

    #[test]
    fn test_monthly_trends_two_months() {
        let reports = vec![
            report(1, json!("A"), "2024-01-10T09:00:00.000Z"),
            report(2, json!("A"), "2024-01-31T23:59:59.999Z"),
            report(3, json!("B"), "2024-03-01T00:00:00.000Z"),
        ];

        let trends = monthly_trends(&reports);
        assert_eq!(trends.len(), 2);
        assert_eq!(trends["2024-01"], 2);
        assert_eq!(trends["2024-03"], 1);
    }

    #[test]
    fn test_monthly_trends_normalizes_offsets_to_utc() {
        let reports = vec![report(1, json!("A"), "2024-02-01T00:30:00+01:00")];
        assert_eq!(monthly_trends(&reports)["2024-01"], 1);
    }

    #[test]
    fn test_compute_statistics_shape() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.total_reports, 0);
        assert!(stats.operator_breakdown.is_empty());

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["averageResponseTime"], json!("Pendiente de implementación"));
        assert!(value.get("totalReports").is_some());
        assert!(value.get("monthlyTrends").is_some());
    }
}
