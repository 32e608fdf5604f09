//! Enrichment of KPI samples with radio-unit reference data

pub mod cache;
pub mod source;

pub use cache::{EnrichmentCache, MappingSnapshot};
pub use source::{MappingSource, SqliteMappingSource};

use pmx_common::{DocumentData, MappingRow, OutputDocument, UNKNOWN};

use crate::model::KpiSample;
use crate::transform::DocumentContext;

/// Build the documents for one sample: one per mapping row, or a single
/// document with every enrichment field set to [`UNKNOWN`] when `rows` is
/// empty or absent.
pub fn build_documents(
    sample: &KpiSample,
    context: &DocumentContext,
    rows: Option<&[MappingRow]>,
) -> Vec<OutputDocument> {
    match rows {
        Some(rows) if !rows.is_empty() => rows
            .iter()
            .map(|row| build_document(sample, context, Some(row)))
            .collect(),
        _ => vec![build_document(sample, context, None)],
    }
}

fn build_document(
    sample: &KpiSample,
    context: &DocumentContext,
    row: Option<&MappingRow>,
) -> OutputDocument {
    let unmatched = MappingRow::default();
    let row = row.unwrap_or(&unmatched);

    OutputDocument {
        // the published ems_id carries the EMS name
        ems_id: or_unknown(&row.ems_name),
        du_id: or_unknown(&row.du_id),
        cell_id: or_unknown(&row.cell_id),
        cell_num: or_unknown(&row.cell_num),
        ru_param: sample.ru_key.clone(),
        data: DocumentData {
            result: sample.value,
            field: sample.field.to_string(),
        },
        meas_date: context.meas_date.clone(),
        end_time: context.end_time.clone(),
        montype_name: sample.family.as_str().to_string(),
        ru_name: or_unknown(&row.ru_id),
        timestamp: context.timestamp.clone(),
        equip_id: context.equip_id.clone(),
        collect_date: context.collect_date.clone(),
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| UNKNOWN.to_string())
}
