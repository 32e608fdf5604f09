//! Document identity and index naming

use chrono::NaiveDate;
use pmx_common::OutputDocument;

const MISSING_PART: &str = "NULL";

/// Deterministic `_id`: `ru_param-cell_num-RU_NAME-field-measdate`.
///
/// Re-ingesting the same export yields the same ids, so documents are
/// overwritten rather than duplicated.
pub fn document_id(doc: &OutputDocument) -> String {
    [
        doc.ru_param.as_str(),
        doc.cell_num.as_str(),
        doc.ru_name.as_str(),
        doc.data.field.as_str(),
        doc.meas_date.as_str(),
    ]
    .map(|part| if part.is_empty() { MISSING_PART } else { part })
    .join("-")
}

/// `<base>-YYYY.MM.DD` from the leading `YYYYMMDD` of `meas_date`, or from
/// `fallback` when that prefix is not eight digits.
pub fn index_name(base: &str, meas_date: &str, fallback: NaiveDate) -> String {
    match meas_date.get(..8) {
        Some(day) if day.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{base}-{}.{}.{}", &day[..4], &day[4..6], &day[6..8])
        }
        _ => format!("{base}-{}", fallback.format("%Y.%m.%d")),
    }
}
