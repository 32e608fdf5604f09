//! Record types shared across PMX

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Placeholder written into every enrichment field that has no mapping value.
pub const UNKNOWN: &str = "UNKNOWN";

/// A single KPI value as published.
///
/// Counts are truncated integers, ratios are already rounded to two decimals.
/// Both serialize as a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(i64),
    Ratio(f64),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Count(v) => write!(f, "{}", v),
            MetricValue::Ratio(v) => write!(f, "{:.2}", v),
        }
    }
}

/// The `data` object of a published document: exactly one field/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    pub result: MetricValue,
    pub field: String,
}

/// Document published to the search index.
///
/// Field names follow the existing index mapping and must not change.
/// Every identifier is always present; missing enrichment is [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub ems_id: String,
    pub du_id: String,
    pub cell_id: String,
    pub cell_num: String,
    pub ru_param: String,
    pub data: DocumentData,
    #[serde(rename = "measdate")]
    pub meas_date: String,
    pub end_time: String,
    pub montype_name: String,
    #[serde(rename = "RU_NAME")]
    pub ru_name: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub equip_id: String,
    #[serde(rename = "collectDate")]
    pub collect_date: String,
}

impl OutputDocument {
    /// Serialize to the JSON body sent to the index.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// One row of the radio-unit asset mapping.
///
/// Rows are keyed by `ru_param` in the reference store; the key itself is
/// not part of the row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRow {
    pub ems_id: Option<String>,
    pub ems_name: Option<String>,
    pub du_id: Option<String>,
    pub ru_id: Option<String>,
    pub du_name: Option<String>,
    pub ru_name: Option<String>,
    pub cell_id: Option<String>,
    pub cell_num: Option<String>,
}
