//! Payload extraction from `atest` console reports.
//!
//! The report is scraped, not decoded: packet sections are found by the marker token,
//! split at the first separator, and the payload is read out of a fixed column of every
//! body line past the header. Blocks or lines that don't fit the layout are skipped and
//! recorded as [`BlockAnomaly`] values; parsing itself never fails.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::format::ReportFormat;
use crate::report::{DecodeResult, DecodedPayload, RawReport};

/// A structural problem in one packet block. Never surfaced as an error.
///
/// `block` is the zero-based index of the block among the marker-delimited segments,
/// `line` the zero-based index of the line within the block body.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockAnomaly {
    #[error("block {block}: no header/body separator")]
    MissingSeparator { block: usize },

    #[error("block {block}: body has {lines} lines, no payload")]
    TooShort { block: usize, lines: usize },

    #[error("block {block} line {line}: {columns} columns, payload column missing")]
    MissingColumn {
        block: usize,
        line: usize,
        columns: usize,
    },
}

/// Result of parsing one report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReport {
    pub result: DecodeResult,
    pub anomalies: Vec<BlockAnomaly>,
}

/// Parse a report using the `atest` layout and return only the payloads.
pub fn parse(report: &str) -> DecodeResult {
    ReportParser::default().parse_str(report).result
}

/// Scraper for one [`ReportFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportParser {
    format: ReportFormat,
}

impl ReportParser {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &ReportFormat {
        &self.format
    }

    pub fn parse(&self, report: &RawReport) -> ParsedReport {
        self.parse_str(report.as_str())
    }

    pub fn parse_str(&self, report: &str) -> ParsedReport {
        let mut parsed = ParsedReport::default();

        // Everything before the first marker is engine chatter.
        for (block, segment) in report.split(self.format.marker).skip(1).enumerate() {
            if let Some(payload) = self.parse_block(block, segment, &mut parsed.anomalies) {
                parsed.result.push(payload);
            }
        }

        debug!(
            packets = parsed.result.len(),
            anomalies = parsed.anomalies.len(),
            "parsed decoder report"
        );
        parsed
    }

    fn parse_block(
        &self,
        block: usize,
        segment: &str,
        anomalies: &mut Vec<BlockAnomaly>,
    ) -> Option<DecodedPayload> {
        let Some((_, body)) = segment.split_once(self.format.separator) else {
            anomalies.push(BlockAnomaly::MissingSeparator { block });
            return None;
        };

        let lines: Vec<&str> = body.split('\n').filter(|line| !line.is_empty()).collect();

        // A short body still yields its (empty) line in the result.
        let mut payload = DecodedPayload::default();
        if lines.len() <= self.format.header_lines {
            anomalies.push(BlockAnomaly::TooShort {
                block,
                lines: lines.len(),
            });
            return Some(payload);
        }

        for (line, text) in lines.iter().enumerate().skip(self.format.header_lines) {
            let mut columns = text.split(self.format.column_separator);
            match columns.nth(self.format.payload_column) {
                Some(column) => payload.push_column(column),
                None => anomalies.push(BlockAnomaly::MissingColumn {
                    block,
                    line,
                    columns: text.split(self.format.column_separator).count(),
                }),
            }
        }

        Some(payload)
    }
}
