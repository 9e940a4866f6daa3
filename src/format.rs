//! Layout description for the external engine's console report.
//!
//! `atest` prints a free-form report, and nothing about its layout is documented.
//! Every assumption the parser makes about it lives in one [`ReportFormat`] value, so a
//! change in the engine's output means changing this file and nothing else.

/// Constants describing one version of the engine's report layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFormat {
    /// Token that starts the detail section of one decoded packet.
    pub marker: &'static str,

    /// Token that splits a packet section into header and body.
    pub separator: &'static str,

    /// Column separator inside a body line.
    pub column_separator: &'static str,

    /// Number of non-empty body lines preceding payload data.
    pub header_lines: usize,

    /// Zero-based column holding the payload text.
    pub payload_column: usize,
}

impl ReportFormat {
    /// Report layout emitted by Dire Wolf's `atest -h`.
    pub const ATEST: ReportFormat = ReportFormat {
        marker: "DECODED",
        separator: "------",
        column_separator: "  ",
        header_lines: 3,
        payload_column: 2,
    };
}

impl Default for ReportFormat {
    fn default() -> Self {
        Self::ATEST
    }
}
