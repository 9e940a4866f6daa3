use std::fmt;

use serde::Serialize;

/// Text captured from one run of the external engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReport(String);

impl RawReport {
    /// The report of a run that produced nothing usable.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a report from raw engine output.
    ///
    /// Invalid UTF-8 sequences are dropped and `\r\n` / `\r` line endings become `\n`.
    pub fn from_bytes_lossy(bytes: &[u8]) -> Self {
        let mut text = String::with_capacity(bytes.len());
        for chunk in bytes.utf8_chunks() {
            text.push_str(chunk.valid());
        }
        if text.contains('\r') {
            text = text.replace("\r\n", "\n").replace('\r', "\n");
        }
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RawReport {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for RawReport {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

/// Reconstructed payload text for a single packet block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DecodedPayload(String);

impl DecodedPayload {
    pub(crate) fn push_column(&mut self, column: &str) {
        self.0.extend(column.chars().filter(|c| *c != ' '));
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DecodedPayload {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

/// Ordered payloads of one report, in the order their blocks appeared.
///
/// Renders as each payload followed by a newline. An empty result renders as an
/// empty string, which is also what a report without packets looks like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DecodeResult {
    payloads: Vec<DecodedPayload>,
}

impl DecodeResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, payload: DecodedPayload) {
        self.payloads.push(payload);
    }

    pub fn payloads(&self) -> &[DecodedPayload] {
        &self.payloads
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }
}

impl fmt::Display for DecodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for payload in &self.payloads {
            writeln!(f, "{}", payload.as_str())?;
        }
        Ok(())
    }
}

impl FromIterator<DecodedPayload> for DecodeResult {
    fn from_iter<I: IntoIterator<Item = DecodedPayload>>(iter: I) -> Self {
        Self {
            payloads: iter.into_iter().collect(),
        }
    }
}
