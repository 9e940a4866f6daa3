//! `hirogari-decoder` — a local AX.25 decode service around Dire Wolf's `atest`.
//!
//! This crate provides:
//! - An invoker that runs the external engine against a recording
//! - A scraper that pulls payload text out of the engine's console report
//! - A decode service tying both together for the HTTP server and CLI
//!
//! The decoding itself is done by the engine. What lives here is the contract for
//! running it and the grammar used to read its report.

// High-level API (most consumers should start here).
pub mod opts;
pub mod service;

// Running the external engine.
pub mod invoker;

// Report layout and payload extraction.
pub mod format;
pub mod parser;
pub mod report;

// Errors and degraded outcomes.
mod error;
pub mod outcome;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use error::{Error, Result};
pub use format::ReportFormat;
pub use invoker::{DecodeRequest, Invocation, Invoker, Platform, ProcessFailure};
pub use opts::Opts;
pub use outcome::{Decoded, Degradation};
pub use parser::{BlockAnomaly, ParsedReport, ReportParser, parse};
pub use report::{DecodeResult, DecodedPayload, RawReport};
pub use service::{DecodeService, ErrorPayload, Protocol};

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
