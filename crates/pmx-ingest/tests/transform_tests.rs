//! Extraction and transform tests over complete export files

use chrono::{DateTime, FixedOffset};
use pmx_common::MetricValue;
use pmx_ingest::error::IngestError;
use pmx_ingest::model::{KpiFamily, KpiSample};
use pmx_ingest::transform::{zip_counters, Counter, FileBatch, TransformEngine};
use std::path::PathBuf;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("A20240102.1200+0900-1215+0900_ME1.xml")
}

fn collected_at() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-01-02T12:16:05+09:00").expect("valid timestamp")
}

fn fixture_batch(period: u32) -> FileBatch {
    TransformEngine::default()
        .extract_file(&fixture_path())
        .expect("Failed to extract fixture")
        .assemble(period, collected_at())
        .expect("Failed to assemble fixture")
}

fn find<'a>(batch: &'a FileBatch, field: &str, ru_key: &str) -> &'a KpiSample {
    batch
        .samples
        .iter()
        .find(|s| s.field == field && s.ru_key == ru_key)
        .unwrap_or_else(|| panic!("no {field} sample for {ru_key}"))
}

fn wrap(blocks: &str, end_time: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<measCollecFile>
  <measData>
    <managedElement localDn="ME=9"/>
    {blocks}
  </measData>
  <fileFooter><measCollec endTime="{end_time}"/></fileFooter>
</measCollecFile>"#
    )
}

const END_TIME: &str = "2024-01-02T12:15:00.000+09:00";

// ============================================================================
// TOKEN PAIRING
// ============================================================================

#[test]
fn test_only_dictionary_counters_survive_pairing() {
    let row = zip_counters(
        "pmFoo(count) ConnNoMax(count) RuPowerMax(W) TotPrbULAvg(%)",
        "1 2 3 4",
    );

    assert_eq!(row.len(), 2);
    assert_eq!(row.get(&Counter::ConnNoMax), Some(&2.0));
    assert_eq!(row.get(&Counter::TotPrbUlAvg), Some(&4.0));
}

// ============================================================================
// FAMILY RULES
// ============================================================================

#[test]
fn test_fixture_sample_counts() {
    let batch = fixture_batch(15);
    let count = |family: KpiFamily| batch.samples.iter().filter(|s| s.family == family).count();

    assert_eq!(count(KpiFamily::Power), 2);
    assert_eq!(count(KpiFamily::MaxUe), 1);
    assert_eq!(count(KpiFamily::Mac), 2);
    assert_eq!(count(KpiFamily::EnDc), 2);
    assert_eq!(count(KpiFamily::Prb), 2);
    assert_eq!(count(KpiFamily::Rrc), 4);
    assert_eq!(batch.samples.len(), 13);
}

#[test]
fn test_per_row_families() {
    let batch = fixture_batch(15);

    assert_eq!(
        find(&batch, "pmConsumedEnergy", "ME=1/DU=1/RU=1").value,
        MetricValue::Ratio(123.46)
    );
    assert_eq!(
        find(&batch, "pmConsumedEnergy", "ME=1/DU=1/RU=2").value,
        MetricValue::Ratio(80.0)
    );
    // counts truncate
    assert_eq!(find(&batch, "UEMax", "ME=1/DU=1/CELL=1").value, MetricValue::Count(7));
    assert_eq!(find(&batch, "MACUL", "ME=1/DU=1/CELL=1").value, MetricValue::Ratio(2.0));
    assert_eq!(find(&batch, "MACDL", "ME=1/DU=1/CELL=1").value, MetricValue::Ratio(5.0));
    assert_eq!(find(&batch, "PRBDL", "ME=1/DU=1/RU=1").value, MetricValue::Ratio(45.68));
    assert_eq!(find(&batch, "PRBUL", "ME=1/DU=1/RU=1").value, MetricValue::Ratio(12.3));
}

#[test]
fn test_dual_connectivity_sums_by_three_segment_prefix() {
    let batch = fixture_batch(15);

    // rows {10,8} and {5,4} share "/DU=1/CELL=1"; "/DU=1" is too short and skipped
    assert_eq!(find(&batch, "ENDCATTEMPT", "ME=1/DU=1/CELL=1").value, MetricValue::Count(15));
    assert_eq!(find(&batch, "ENDCSUCCRATE", "ME=1/DU=1/CELL=1").value, MetricValue::Ratio(80.0));
    assert!(batch
        .samples
        .iter()
        .all(|s| s.family != KpiFamily::EnDc || s.ru_key == "ME=1/DU=1/CELL=1"));
}

#[test]
fn test_rrc_merges_establishment_and_reestablishment() {
    let batch = fixture_batch(15);

    assert_eq!(find(&batch, "RRCATTEMPT", "ME=1/DU=1/CELL=1").value, MetricValue::Count(120));
    assert_eq!(find(&batch, "RRCSUCCRATE", "ME=1/DU=1/CELL=1").value, MetricValue::Ratio(87.5));

    // zero attempts: rate is 0, not a division error
    assert_eq!(find(&batch, "RRCATTEMPT", "ME=1/DU=1/CELL=2").value, MetricValue::Count(0));
    assert_eq!(find(&batch, "RRCSUCCRATE", "ME=1/DU=1/CELL=2").value, MetricValue::Ratio(0.0));
}

#[test]
fn test_rrc_reestablishment_only_subpath() {
    let xml = wrap(
        r#"<measInfo measInfoId="RRC/RRC Connection Re-establishment">
             <measTypes>ConnReEstabAtt(count) ConnReEstabSucc(count) ConnEstabAtt(count)</measTypes>
             <measValue measObjLdn="X/A/B/C"><measResults>4 1 1000</measResults></measValue>
           </measInfo>"#,
        END_TIME,
    );
    let batch = TransformEngine::default()
        .extract(xml.as_bytes())
        .unwrap()
        .assemble(5, collected_at())
        .unwrap();

    // establishment counters inside the re-establishment block are not merged
    assert_eq!(find(&batch, "RRCATTEMPT", "ME=9/A/B").value, MetricValue::Count(4));
    assert_eq!(find(&batch, "RRCSUCCRATE", "ME=9/A/B").value, MetricValue::Ratio(25.0));
}

#[test]
fn test_missing_results_default_to_zero() {
    let xml = wrap(
        r#"<measInfo measInfoId="Packet Statistics/Air MAC Packet">
             <measTypes>AirMacULByte(Kbytes) AirMacDLByte(Kbytes)</measTypes>
             <measValue measObjLdn="/RU=1"><measResults>1024</measResults></measValue>
             <measValue measObjLdn="/RU=2"/>
           </measInfo>"#,
        END_TIME,
    );
    let batch = TransformEngine::default()
        .extract(xml.as_bytes())
        .unwrap()
        .assemble(15, collected_at())
        .unwrap();

    assert_eq!(find(&batch, "MACUL", "ME=9/RU=1").value, MetricValue::Ratio(1.0));
    assert_eq!(find(&batch, "MACDL", "ME=9/RU=1").value, MetricValue::Ratio(0.0));
    assert_eq!(find(&batch, "MACUL", "ME=9/RU=2").value, MetricValue::Ratio(0.0));
}

// ============================================================================
// COLLECTION PERIOD GATING
// ============================================================================

#[test]
fn test_hourly_period_emits_power_only() {
    let batch = fixture_batch(60);

    assert_eq!(batch.samples.len(), 2);
    assert!(batch.samples.iter().all(|s| s.family == KpiFamily::Power));
}

#[test]
fn test_quarter_hour_period_emits_power_and_prb() {
    let batch = fixture_batch(15);

    assert!(batch.samples.iter().any(|s| s.family == KpiFamily::Power));
    assert!(batch.samples.iter().any(|s| s.family == KpiFamily::Prb));
}

// ============================================================================
// ENVELOPE
// ============================================================================

#[test]
fn test_document_context_from_fixture() {
    let batch = fixture_batch(15);

    assert_eq!(batch.context.meas_date, "202401021215");
    assert_eq!(batch.context.end_time, "2024-01-02 12:15");
    assert_eq!(batch.context.timestamp, "2024-01-02T03:15:00.000Z");
    assert_eq!(batch.context.collect_date, "2024-01-02 12:16");
    assert_eq!(batch.context.equip_id, "ME=1");
}

#[test]
fn test_empty_end_time_fails_whole_file() {
    let xml = wrap(
        r#"<measInfo measInfoId="Resource Management/RU Power Consumption">
             <measTypes>RuPowerAvg(W)</measTypes>
             <measValue measObjLdn="/RU=1"><measResults>10</measResults></measValue>
           </measInfo>
           <measInfo measInfoId="RRU/Total PRB Usage">
             <measTypes>TotPrbDLAvg(%)</measTypes>
             <measValue measObjLdn="/RU=1"><measResults>10</measResults></measValue>
           </measInfo>"#,
        "",
    );
    let parsed = TransformEngine::default().extract(xml.as_bytes()).unwrap();
    assert!(parsed.families.iter().any(|f| !f.rows.is_empty()));

    let result = parsed.assemble(15, collected_at());
    assert!(matches!(result, Err(IngestError::EndTime { ref value, .. }) if value.is_empty()));
}

#[test]
fn test_missing_file_is_io_error() {
    let result = TransformEngine::default().extract_file(&fixture_path().with_file_name("absent.xml"));
    assert!(matches!(result, Err(IngestError::Io { .. })));
}

#[test]
fn test_truncated_file_keeps_closed_blocks() {
    let full = std::fs::read_to_string(fixture_path()).unwrap();
    let cut = full.find("<measInfo measInfoId=\"RRU/Total PRB Usage\">").unwrap();
    let truncated = &full[..cut];

    let parsed = TransformEngine::default().extract(truncated.as_bytes()).unwrap();
    // POWER, MAXUE, MAC and ENDC closed before the cut, plus the merged RRC family
    let families: Vec<_> = parsed.families.iter().map(|f| f.family).collect();
    assert_eq!(
        families,
        vec![KpiFamily::Power, KpiFamily::MaxUe, KpiFamily::Mac, KpiFamily::EnDc, KpiFamily::Rrc]
    );
    // the footer never arrived
    assert!(parsed.envelope.end_time.is_empty());
}
