//! Streaming reader over PM export XML
//!
//! Yields the collection end time, the managed element DN and each
//! `measInfo` block as soon as it closes. The document tree is never
//! materialized; at most one block is buffered.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// One `measValue` row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasRow {
    pub object_ldn: String,
    pub results: String,
}

/// One closed `measInfo` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasBlock {
    pub measurement_id: String,
    pub types: String,
    pub rows: Vec<MeasRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    EndTime(String),
    ManagedElement(String),
    Block(MeasBlock),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Capture {
    #[default]
    Nothing,
    Types,
    Results,
}

#[derive(Debug, Default)]
struct BlockState {
    block: Option<MeasBlock>,
    row: Option<MeasRow>,
    capture: Capture,
    text: String,
    types_seen: bool,
    results_seen: bool,
}

pub struct MeasReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: BlockState,
    last_error_position: Option<u64>,
}

impl<R: BufRead> MeasReader<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            state: BlockState::default(),
            last_error_position: None,
        }
    }

    /// Next item of interest, or `None` at end of input.
    ///
    /// Malformed nodes are logged and skipped. I/O failures and a reader
    /// stuck on the same byte offset are returned as errors.
    pub fn next_item(&mut self) -> Result<Option<StreamItem>> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(source) => {
                    let position = self.reader.buffer_position();
                    if matches!(source, quick_xml::Error::Io(_))
                        || self.last_error_position == Some(position)
                    {
                        return Err(IngestError::Xml { position, source });
                    }
                    warn!(position, error = %source, "Skipping malformed XML node");
                    self.last_error_position = Some(position);
                    continue;
                }
            };

            if let Event::Eof = event {
                if let Some(block) = self.state.block.take() {
                    warn!(
                        measurement_id = %block.measurement_id,
                        "Dropping measInfo block left open at end of file"
                    );
                }
                return Ok(None);
            }

            if let Some(item) = self.state.on_event(event) {
                return Ok(Some(item));
            }
        }
    }
}

impl<R: BufRead> Iterator for MeasReader<R> {
    type Item = Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

impl BlockState {
    fn on_event(&mut self, event: Event<'_>) -> Option<StreamItem> {
        match event {
            Event::Start(e) => self.open(&e, false),
            Event::Empty(e) => self.open(&e, true),
            Event::End(e) => self.close(e.local_name().as_ref()),
            Event::Text(t) if self.capture != Capture::Nothing => {
                match t.unescape() {
                    Ok(text) => self.push_text(&text),
                    Err(err) => warn!(error = %err, "Skipping undecodable text"),
                }
                None
            }
            Event::CData(c) if self.capture != Capture::Nothing => {
                self.push_text(&String::from_utf8_lossy(&c));
                None
            }
            _ => None,
        }
    }

    fn push_text(&mut self, text: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> Option<StreamItem> {
        match e.local_name().as_ref() {
            b"measCollec" => attribute(e, b"endTime").map(StreamItem::EndTime),
            b"managedElement" => attribute(e, b"localDn").map(StreamItem::ManagedElement),
            b"measInfo" => {
                if empty {
                    return None;
                }
                if let Some(open) = &self.block {
                    warn!(
                        measurement_id = %open.measurement_id,
                        "Discarding measInfo block that never closed"
                    );
                }
                self.block = Some(MeasBlock {
                    measurement_id: attribute(e, b"measInfoId").unwrap_or_default(),
                    ..MeasBlock::default()
                });
                self.row = None;
                self.capture = Capture::Nothing;
                self.types_seen = false;
                None
            }
            b"measTypes" if self.block.is_some() && self.row.is_none() && !self.types_seen => {
                self.begin_capture(Capture::Types, empty);
                None
            }
            b"measValue" => {
                let block = self.block.as_mut()?;
                let row = MeasRow {
                    object_ldn: attribute(e, b"measObjLdn").unwrap_or_default(),
                    results: String::new(),
                };
                if empty {
                    block.rows.push(row);
                } else {
                    self.row = Some(row);
                    self.results_seen = false;
                }
                None
            }
            b"measResults" if self.row.is_some() && !self.results_seen => {
                self.begin_capture(Capture::Results, empty);
                None
            }
            _ => None,
        }
    }

    fn begin_capture(&mut self, capture: Capture, empty: bool) {
        self.text.clear();
        if empty {
            self.finish_capture(capture);
        } else {
            self.capture = capture;
        }
    }

    fn finish_capture(&mut self, capture: Capture) {
        let text = std::mem::take(&mut self.text);
        match capture {
            Capture::Types => {
                if let Some(block) = self.block.as_mut() {
                    block.types = text;
                }
                self.types_seen = true;
            }
            Capture::Results => {
                if let Some(row) = self.row.as_mut() {
                    row.results = text;
                }
                self.results_seen = true;
            }
            Capture::Nothing => {}
        }
        self.capture = Capture::Nothing;
    }

    fn close(&mut self, name: &[u8]) -> Option<StreamItem> {
        match name {
            b"measTypes" if self.capture == Capture::Types => {
                self.finish_capture(Capture::Types);
                None
            }
            b"measResults" if self.capture == Capture::Results => {
                self.finish_capture(Capture::Results);
                None
            }
            b"measValue" => {
                if let (Some(row), Some(block)) = (self.row.take(), self.block.as_mut()) {
                    block.rows.push(row);
                }
                None
            }
            b"measInfo" => {
                self.row = None;
                self.capture = Capture::Nothing;
                let block = self.block.take()?;
                debug!(
                    measurement_id = %block.measurement_id,
                    rows = block.rows.len(),
                    "Closed measurement block"
                );
                Some(StreamItem::Block(block))
            }
            _ => None,
        }
    }
}

/// Unescaped value of the attribute with the given local name.
fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                warn!(error = %err, "Skipping malformed attribute list");
                return None;
            }
        };
        if attr.key.local_name().as_ref() != name {
            continue;
        }
        return match attr.unescape_value() {
            Ok(value) => Some(value.into_owned()),
            Err(err) => {
                warn!(error = %err, "Skipping undecodable attribute value");
                None
            }
        };
    }
    None
}
