//! KPI family registry
//!
//! Each measurement block is identified by its `measInfoId`. The registry maps
//! that id to a [`FamilyDescriptor`] describing how object keys are derived,
//! how rows are aggregated and which fields are emitted. Adding a family is a
//! new descriptor, not new dispatch code.

use pmx_common::MetricValue;
use std::collections::HashMap;

use super::numeric::{parse_value, round2, success_rate, truncate};
use crate::model::KpiFamily;

/// Vendor counters retained from `measTypes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    RuPowerAvg,
    ConnNoMax,
    AirMacUlKbytes,
    AirMacDlKbytes,
    EnDcAddAtt,
    EnDcAddSucc,
    TotPrbDlAvg,
    TotPrbUlAvg,
    ConnEstabAtt,
    ConnEstabSucc,
    ConnReEstabAtt,
    ConnReEstabSucc,
}

impl Counter {
    /// Resolve a `measTypes` token; unknown tokens are not counters.
    pub fn from_token(token: &str) -> Option<Self> {
        let counter = match token {
            "RuPowerAvg(W)" => Counter::RuPowerAvg,
            "ConnNoMax(count)" => Counter::ConnNoMax,
            "AirMacULByte(Kbytes)" => Counter::AirMacUlKbytes,
            "AirMacDLByte(Kbytes)" => Counter::AirMacDlKbytes,
            "EnDc_AddAtt(count)" => Counter::EnDcAddAtt,
            "EnDc_AddSucc(count)" => Counter::EnDcAddSucc,
            "TotPrbDLAvg(%)" => Counter::TotPrbDlAvg,
            "TotPrbULAvg(%)" => Counter::TotPrbUlAvg,
            "ConnEstabAtt(count)" => Counter::ConnEstabAtt,
            "ConnEstabSucc(count)" => Counter::ConnEstabSucc,
            "ConnReEstabAtt(count)" => Counter::ConnReEstabAtt,
            "ConnReEstabSucc(count)" => Counter::ConnReEstabSucc,
            _ => return None,
        };
        Some(counter)
    }
}

/// Counter values of one measurement row (or of an aggregated key).
pub type CounterRow = HashMap<Counter, f64>;

/// Pair `measTypes` tokens with `measResults` tokens by position.
///
/// Only dictionary counters are kept. Values missing at the tail of the
/// results list count as 0.
pub fn zip_counters(types: &str, results: &str) -> CounterRow {
    let mut values = results.split_whitespace();
    let mut row = CounterRow::new();
    for token in types.split_whitespace() {
        let value = values.next().map(parse_value).unwrap_or(0.0);
        if let Some(counter) = Counter::from_token(token) {
            row.insert(counter, value);
        }
    }
    row
}

fn counter_sum(row: &CounterRow, counters: &[Counter]) -> f64 {
    counters
        .iter()
        .map(|c| row.get(c).copied().unwrap_or(0.0))
        .sum()
}

/// How the radio-unit key is derived from `measObjLdn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    /// The object path as written
    Verbatim,
    /// The first `n` `/`-separated segments; shorter paths are skipped
    LeadingSegments(usize),
    /// `/` followed by segments 1 and 2, dropping segment 0; shorter paths are skipped
    DropFirstSegment,
}

impl KeyRule {
    pub fn derive(self, object_ldn: &str) -> Option<String> {
        match self {
            KeyRule::Verbatim => Some(object_ldn.to_string()),
            KeyRule::LeadingSegments(n) => {
                let parts: Vec<&str> = object_ldn.split('/').collect();
                (parts.len() >= n).then(|| parts[..n].join("/"))
            }
            KeyRule::DropFirstSegment => {
                let parts: Vec<&str> = object_ldn.split('/').collect();
                (parts.len() >= 3).then(|| format!("/{}/{}", parts[1], parts[2]))
            }
        }
    }
}

/// How rows of a block turn into keyed counter rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Each row is its own sample source
    PerRow,
    /// Rows sharing a key are summed within the block
    SumByKey,
    /// The listed counters are accumulated into a file-wide table and
    /// emitted once at end of stream as `into`
    Deferred {
        into: KpiFamily,
        counters: &'static [Counter],
    },
}

/// How one emitted field is computed from a counter row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derivation {
    /// `round2(counter / divisor)`
    Scaled { counter: Counter, divisor: f64 },
    /// Truncated sum of the counters
    Count { counters: &'static [Counter] },
    /// Percentage of attempts that succeeded, 0 when nothing was attempted
    SuccessRate {
        successes: &'static [Counter],
        attempts: &'static [Counter],
    },
}

impl Derivation {
    pub fn evaluate(&self, row: &CounterRow) -> MetricValue {
        match self {
            Derivation::Scaled { counter, divisor } => {
                let value = row.get(counter).copied().unwrap_or(0.0);
                MetricValue::Ratio(round2(value / divisor))
            }
            Derivation::Count { counters } => {
                MetricValue::Count(truncate(counter_sum(row, counters)))
            }
            Derivation::SuccessRate {
                successes,
                attempts,
            } => MetricValue::Ratio(success_rate(
                counter_sum(row, successes),
                counter_sum(row, attempts),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub derivation: Derivation,
}

/// Transform of one measurement block type.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyDescriptor {
    pub measurement_id: &'static str,
    pub family: KpiFamily,
    pub key: KeyRule,
    pub aggregation: Aggregation,
    /// Empty for deferred blocks; their fields live on the merged family
    pub fields: &'static [FieldSpec],
}

/// A family emitted after the stream from accumulated deferred rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFamily {
    pub family: KpiFamily,
    pub fields: &'static [FieldSpec],
}

const RRC_ATTEMPTS: &[Counter] = &[Counter::ConnEstabAtt, Counter::ConnReEstabAtt];
const RRC_SUCCESSES: &[Counter] = &[Counter::ConnEstabSucc, Counter::ConnReEstabSucc];

const POWER_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "pmConsumedEnergy",
    derivation: Derivation::Scaled {
        counter: Counter::RuPowerAvg,
        divisor: 1.0,
    },
}];

const MAXUE_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "UEMax",
    derivation: Derivation::Count {
        counters: &[Counter::ConnNoMax],
    },
}];

const MAC_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "MACUL",
        derivation: Derivation::Scaled {
            counter: Counter::AirMacUlKbytes,
            divisor: 1024.0,
        },
    },
    FieldSpec {
        name: "MACDL",
        derivation: Derivation::Scaled {
            counter: Counter::AirMacDlKbytes,
            divisor: 1024.0,
        },
    },
];

const ENDC_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "ENDCATTEMPT",
        derivation: Derivation::Count {
            counters: &[Counter::EnDcAddAtt],
        },
    },
    FieldSpec {
        name: "ENDCSUCCRATE",
        derivation: Derivation::SuccessRate {
            successes: &[Counter::EnDcAddSucc],
            attempts: &[Counter::EnDcAddAtt],
        },
    },
];

const PRB_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "PRBDL",
        derivation: Derivation::Scaled {
            counter: Counter::TotPrbDlAvg,
            divisor: 1.0,
        },
    },
    FieldSpec {
        name: "PRBUL",
        derivation: Derivation::Scaled {
            counter: Counter::TotPrbUlAvg,
            divisor: 1.0,
        },
    },
];

const RRC_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "RRCATTEMPT",
        derivation: Derivation::Count {
            counters: RRC_ATTEMPTS,
        },
    },
    FieldSpec {
        name: "RRCSUCCRATE",
        derivation: Derivation::SuccessRate {
            successes: RRC_SUCCESSES,
            attempts: RRC_ATTEMPTS,
        },
    },
];

/// Lookup table from `measInfoId` to its transform.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    blocks: HashMap<&'static str, FamilyDescriptor>,
    merged: Vec<MergedFamily>,
}

impl FamilyRegistry {
    pub fn new(blocks: Vec<FamilyDescriptor>, merged: Vec<MergedFamily>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|d| (d.measurement_id, d)).collect(),
            merged,
        }
    }

    /// The six families of the radio PM export
    pub fn standard() -> Self {
        let blocks = vec![
            FamilyDescriptor {
                measurement_id: "Resource Management/RU Power Consumption",
                family: KpiFamily::Power,
                key: KeyRule::Verbatim,
                aggregation: Aggregation::PerRow,
                fields: POWER_FIELDS,
            },
            FamilyDescriptor {
                measurement_id: "RRC/RRC Connection Number",
                family: KpiFamily::MaxUe,
                key: KeyRule::Verbatim,
                aggregation: Aggregation::PerRow,
                fields: MAXUE_FIELDS,
            },
            FamilyDescriptor {
                measurement_id: "Packet Statistics/Air MAC Packet",
                family: KpiFamily::Mac,
                key: KeyRule::Verbatim,
                aggregation: Aggregation::PerRow,
                fields: MAC_FIELDS,
            },
            FamilyDescriptor {
                measurement_id: "E-UTRA-NR Dual Connectivity/EN-DC Addition Information",
                family: KpiFamily::EnDc,
                key: KeyRule::LeadingSegments(3),
                aggregation: Aggregation::SumByKey,
                fields: ENDC_FIELDS,
            },
            FamilyDescriptor {
                measurement_id: "RRU/Total PRB Usage",
                family: KpiFamily::Prb,
                key: KeyRule::Verbatim,
                aggregation: Aggregation::PerRow,
                fields: PRB_FIELDS,
            },
            FamilyDescriptor {
                measurement_id: "RRC/RRC Connection Establishment",
                family: KpiFamily::Rrc,
                key: KeyRule::DropFirstSegment,
                aggregation: Aggregation::Deferred {
                    into: KpiFamily::Rrc,
                    counters: &[Counter::ConnEstabAtt, Counter::ConnEstabSucc],
                },
                fields: &[],
            },
            FamilyDescriptor {
                measurement_id: "RRC/RRC Connection Re-establishment",
                family: KpiFamily::Rrc,
                key: KeyRule::DropFirstSegment,
                aggregation: Aggregation::Deferred {
                    into: KpiFamily::Rrc,
                    counters: &[Counter::ConnReEstabAtt, Counter::ConnReEstabSucc],
                },
                fields: &[],
            },
        ];
        let merged = vec![MergedFamily {
            family: KpiFamily::Rrc,
            fields: RRC_FIELDS,
        }];
        Self::new(blocks, merged)
    }

    pub fn descriptor(&self, measurement_id: &str) -> Option<&FamilyDescriptor> {
        self.blocks.get(measurement_id)
    }

    /// Merged families in emission order
    pub fn merged(&self) -> &[MergedFamily] {
        &self.merged
    }
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
