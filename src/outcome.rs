use serde::Serialize;

use crate::invoker::ProcessFailure;
use crate::parser::BlockAnomaly;
use crate::report::DecodeResult;

/// A non-fatal problem met while decoding.
///
/// Degradations never turn into errors. They are carried next to the result so callers
/// that care (logs, metrics, the CLI's JSON output) can tell a failed run from an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "detail", rename_all = "snake_case")]
pub enum Degradation {
    Process(ProcessFailure),
    Block(BlockAnomaly),
}

impl From<ProcessFailure> for Degradation {
    fn from(failure: ProcessFailure) -> Self {
        Self::Process(failure)
    }
}

impl From<BlockAnomaly> for Degradation {
    fn from(anomaly: BlockAnomaly) -> Self {
        Self::Block(anomaly)
    }
}

/// Result of a decode call that was not rejected outright.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decoded {
    pub result: DecodeResult,
    pub degradations: Vec<Degradation>,
}

impl Decoded {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Whether the engine process itself failed.
    pub fn process_failed(&self) -> bool {
        self.degradations
            .iter()
            .any(|d| matches!(d, Degradation::Process(_)))
    }

    /// The newline-delimited payload text returned to callers.
    pub fn text(&self) -> String {
        self.result.to_string()
    }
}
