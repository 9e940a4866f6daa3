use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default deadline for one run of the external engine.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Options that control how the external engine is invoked.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The binaries map their flags into this type so the library can be driven from
/// tests or other frontends without going through `clap`.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Executable to run instead of the platform's default `atest` invocation.
    ///
    /// The platform check still applies; this only replaces the program path.
    pub program: Option<PathBuf>,

    /// Working directory for the engine process.
    ///
    /// The default invocation on Linux and macOS is `./atest`, so this is usually the
    /// directory the engine binary was unpacked into.
    pub working_dir: Option<PathBuf>,

    /// Deadline for one engine run. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Opts {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::msg("decoder timeout must be greater than zero"));
        }
        if let Some(program) = &self.program {
            if program.as_os_str().is_empty() {
                return Err(Error::msg("decoder program path must not be empty"));
            }
        }
        Ok(())
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            program: None,
            working_dir: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}
