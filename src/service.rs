//! The inbound decode operation: `{protocol, path, baudRate}` in, payload text out.
//!
//! This is what the HTTP server and the CLI call. It validates the protocol, runs the
//! engine through the [`Invoker`], and scrapes the report with a [`ReportParser`].

use serde::Serialize;
use tracing::{info, warn};

use crate::invoker::{DecodeRequest, Invoker};
use crate::opts::Opts;
use crate::outcome::{Decoded, Degradation};
use crate::parser::ReportParser;
use crate::{Error, Result};

/// Protocols the engine is driven for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ax25,
}

impl Protocol {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some("ax25") => Ok(Self::Ax25),
            _ => Err(Error::InvalidProtocol),
        }
    }
}

/// JSON body for a rejected decode call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodeService {
    invoker: Invoker,
    parser: ReportParser,
}

impl DecodeService {
    /// Create a service for the host platform using the `atest` report layout.
    pub fn new(opts: Opts) -> Result<Self> {
        Ok(Self::with_parts(Invoker::new(opts)?, ReportParser::default()))
    }

    pub fn with_parts(invoker: Invoker, parser: ReportParser) -> Self {
        Self { invoker, parser }
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Handle a decode call with raw, possibly missing, parameters.
    ///
    /// A missing path or baud rate is passed on as an empty string; an empty path then
    /// fails the file check like any other missing file.
    pub async fn decode_result(
        &self,
        protocol: Option<&str>,
        path: Option<&str>,
        baud_rate: Option<&str>,
    ) -> Result<Decoded> {
        match Protocol::parse(protocol)? {
            Protocol::Ax25 => {
                let file_path = path.unwrap_or_default();
                let request = DecodeRequest::new(file_path, baud_rate.unwrap_or_default());
                self.decode(&request).await
            }
        }
    }

    /// Run one decode: invoke the engine, then parse its report.
    pub async fn decode(&self, request: &DecodeRequest) -> Result<Decoded> {
        let invocation = self.invoker.decode(request).await?;
        let parsed = self.parser.parse(&invocation.report);

        let mut degradations: Vec<Degradation> = Vec::new();
        degradations.extend(invocation.failure.map(Degradation::from));
        degradations.extend(parsed.anomalies.into_iter().map(Degradation::from));

        for degradation in &degradations {
            if let Degradation::Block(anomaly) = degradation {
                warn!(%anomaly, "skipped malformed report content");
            }
        }

        info!(
            packets = parsed.result.len(),
            degraded = !degradations.is_empty(),
            "decode finished"
        );

        Ok(Decoded {
            result: parsed.result,
            degradations,
        })
    }
}
