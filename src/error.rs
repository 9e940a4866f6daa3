use thiserror::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal decode errors.
///
/// Only failures the caller can act on live here. Anything that happens once the
/// external engine is running (process failures, malformed report blocks) is absorbed
/// into a [`crate::Degradation`] instead, so a failed decode looks like an empty one.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid URL parameter: 'protocol'")]
    InvalidProtocol,

    #[error("File not found")]
    NotFound,

    #[error("OS not supported")]
    UnsupportedPlatform { os: String },

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// HTTP-equivalent status for this error.
    ///
    /// Bad input (protocol, missing file) is a 400; everything else is a 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidProtocol | Self::NotFound => 400,
            _ => 500,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}
