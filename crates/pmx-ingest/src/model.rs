//! Pipeline record types

use chrono::{DateTime, Utc};
use pmx_common::MetricValue;
use serde::Serialize;
use std::path::PathBuf;

/// A detected export file waiting for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            detected_at: Utc::now(),
        }
    }
}

/// Per-file metadata shared by every sample of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionEnvelope {
    /// `measCollec@endTime`, as written by the element manager
    pub end_time: String,
    /// `managedElement@localDn` of the reporting element
    pub managed_element: String,
}

/// KPI category; the wire name is published as `montype_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum KpiFamily {
    #[serde(rename = "POWER")]
    Power,
    #[serde(rename = "MAXUE")]
    MaxUe,
    #[serde(rename = "MAC")]
    Mac,
    #[serde(rename = "ENDC")]
    EnDc,
    #[serde(rename = "PRB")]
    Prb,
    #[serde(rename = "RRC")]
    Rrc,
}

impl KpiFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            KpiFamily::Power => "POWER",
            KpiFamily::MaxUe => "MAXUE",
            KpiFamily::Mac => "MAC",
            KpiFamily::EnDc => "ENDC",
            KpiFamily::Prb => "PRB",
            KpiFamily::Rrc => "RRC",
        }
    }

    /// Hourly exports are only collected for power consumption.
    pub fn emitted_for_period(self, collection_period: u32) -> bool {
        collection_period != crate::config::HOURLY_COLLECTION_PERIOD || self == KpiFamily::Power
    }
}

impl std::fmt::Display for KpiFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One KPI value extracted from a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSample {
    pub family: KpiFamily,
    pub field: &'static str,
    /// Management element DN followed by the family-specific object key
    pub ru_key: String,
    pub value: MetricValue,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hourly_period_keeps_power_only() {
        assert!(KpiFamily::Power.emitted_for_period(60));
        for family in [
            KpiFamily::MaxUe,
            KpiFamily::Mac,
            KpiFamily::EnDc,
            KpiFamily::Prb,
            KpiFamily::Rrc,
        ] {
            assert!(!family.emitted_for_period(60), "{family} leaked at 60");
            assert!(family.emitted_for_period(15));
            assert!(family.emitted_for_period(5));
        }
    }

    #[test]
    fn test_family_wire_name() {
        assert_eq!(serde_json::to_string(&KpiFamily::EnDc).unwrap(), "\"ENDC\"");
        assert_eq!(KpiFamily::MaxUe.to_string(), "MAXUE");
    }
}
