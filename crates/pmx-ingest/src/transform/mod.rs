//! Extraction and transform engine
//!
//! A file is processed in two phases:
//!
//! 1. [`TransformEngine::extract`] streams the XML and folds every registered
//!    measurement block into keyed counter rows ([`ParsedFile`]).
//! 2. [`ParsedFile::assemble`] parses the envelope end time, applies the
//!    collection-period gate and derives the emitted [`KpiSample`]s.
//!
//! No sample exists until the end time has parsed, so a file with a bad
//! timestamp never produces partial output.

pub mod families;
pub mod numeric;
pub mod reader;

pub use families::{
    zip_counters, Aggregation, Counter, CounterRow, Derivation, FamilyDescriptor, FamilyRegistry,
    FieldSpec, KeyRule, MergedFamily,
};
pub use numeric::{parse_value, round2};
pub use reader::{MeasBlock, MeasReader, MeasRow, StreamItem};

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::model::{CollectionEnvelope, KpiFamily, KpiSample};

/// `measCollec@endTime` layout; the fractional seconds are optional
pub const END_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

const MEAS_DATE_FORMAT: &str = "%Y%m%d%H%M";
const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Keyed counter rows of one family, ready for field derivation
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyRows {
    pub family: KpiFamily,
    pub fields: &'static [FieldSpec],
    pub rows: Vec<(String, CounterRow)>,
}

/// Result of streaming one file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub envelope: CollectionEnvelope,
    pub families: Vec<FamilyRows>,
}

/// Envelope-derived fields shared by every document of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContext {
    /// `YYYYMMDDhhmm` in the file's own offset
    pub meas_date: String,
    /// `YYYY-MM-DD hh:mm` in the file's own offset
    pub end_time: String,
    /// UTC, millisecond precision
    pub timestamp: String,
    /// Processing wall clock, `YYYY-MM-DD hh:mm`
    pub collect_date: String,
    pub equip_id: String,
}

impl DocumentContext {
    pub fn from_envelope(
        envelope: &CollectionEnvelope,
        collected_at: DateTime<FixedOffset>,
    ) -> Result<Self> {
        let end = DateTime::parse_from_str(&envelope.end_time, END_TIME_FORMAT).map_err(
            |source| IngestError::EndTime {
                value: envelope.end_time.clone(),
                source,
            },
        )?;

        Ok(Self {
            meas_date: end.format(MEAS_DATE_FORMAT).to_string(),
            end_time: end.format(MINUTE_FORMAT).to_string(),
            timestamp: end.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string(),
            collect_date: collected_at.format(MINUTE_FORMAT).to_string(),
            equip_id: envelope.managed_element.clone(),
        })
    }
}

/// Samples of one file plus their shared document context
#[derive(Debug, Clone, PartialEq)]
pub struct FileBatch {
    pub context: DocumentContext,
    pub samples: Vec<KpiSample>,
}

impl ParsedFile {
    /// Derive the emitted samples.
    ///
    /// Fails without producing anything if the end time does not parse.
    pub fn assemble(
        self,
        collection_period: u32,
        collected_at: DateTime<FixedOffset>,
    ) -> Result<FileBatch> {
        let context = DocumentContext::from_envelope(&self.envelope, collected_at)?;
        let managed_element = &self.envelope.managed_element;

        let mut samples = Vec::new();
        for group in &self.families {
            if !group.family.emitted_for_period(collection_period) {
                continue;
            }
            for (key, row) in &group.rows {
                let ru_key = format!("{managed_element}{key}");
                for field in group.fields {
                    samples.push(KpiSample {
                        family: group.family,
                        field: field.name,
                        ru_key: ru_key.clone(),
                        value: field.derivation.evaluate(row),
                    });
                }
            }
        }

        Ok(FileBatch { context, samples })
    }
}

/// Streaming transform driven by a [`FamilyRegistry`]
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    registry: Arc<FamilyRegistry>,
}

impl TransformEngine {
    pub fn new(registry: FamilyRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &FamilyRegistry {
        &self.registry
    }

    /// Open and extract a file from disk
    pub fn extract_file(&self, path: &Path) -> Result<ParsedFile> {
        let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
        self.extract(BufReader::new(file))
    }

    pub fn extract<R: BufRead>(&self, source: R) -> Result<ParsedFile> {
        let mut envelope = CollectionEnvelope::default();
        let mut families = Vec::new();
        let mut deferred: HashMap<KpiFamily, BTreeMap<String, CounterRow>> = HashMap::new();

        let mut reader = MeasReader::new(source);
        while let Some(item) = reader.next_item()? {
            match item {
                StreamItem::EndTime(value) => envelope.end_time = value,
                StreamItem::ManagedElement(dn) => envelope.managed_element = dn,
                StreamItem::Block(block) => {
                    if let Some(rows) = self.fold_block(&block, &mut deferred) {
                        families.push(rows);
                    }
                }
            }
        }

        for merged in self.registry.merged() {
            let rows = deferred.remove(&merged.family).unwrap_or_default();
            families.push(FamilyRows {
                family: merged.family,
                fields: merged.fields,
                rows: rows.into_iter().collect(),
            });
        }

        Ok(ParsedFile { envelope, families })
    }

    /// Fold one block; deferred blocks only feed `deferred` and return `None`.
    fn fold_block(
        &self,
        block: &MeasBlock,
        deferred: &mut HashMap<KpiFamily, BTreeMap<String, CounterRow>>,
    ) -> Option<FamilyRows> {
        let Some(descriptor) = self.registry.descriptor(&block.measurement_id) else {
            debug!(measurement_id = %block.measurement_id, "Ignoring unregistered measurement block");
            return None;
        };

        let keyed = block.rows.iter().filter_map(|row| {
            let key = descriptor.key.derive(&row.object_ldn);
            if key.is_none() {
                debug!(
                    measurement_id = descriptor.measurement_id,
                    object_ldn = %row.object_ldn,
                    "Skipping row with too few path segments"
                );
            }
            key.map(|key| (key, zip_counters(&block.types, &row.results)))
        });

        match descriptor.aggregation {
            Aggregation::PerRow => Some(FamilyRows {
                family: descriptor.family,
                fields: descriptor.fields,
                rows: keyed.collect(),
            }),
            Aggregation::SumByKey => {
                let mut sums: BTreeMap<String, CounterRow> = BTreeMap::new();
                for (key, counters) in keyed {
                    let total = sums.entry(key).or_default();
                    for (counter, value) in counters {
                        *total.entry(counter).or_insert(0.0) += value;
                    }
                }
                Some(FamilyRows {
                    family: descriptor.family,
                    fields: descriptor.fields,
                    rows: sums.into_iter().collect(),
                })
            }
            Aggregation::Deferred { into, counters } => {
                let table = deferred.entry(into).or_default();
                for (key, row) in keyed {
                    let total = table.entry(key).or_default();
                    for counter in counters {
                        *total.entry(*counter).or_insert(0.0) +=
                            row.get(counter).copied().unwrap_or(0.0);
                    }
                }
                None
            }
        }
    }
}
