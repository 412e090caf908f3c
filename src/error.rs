use std::error::Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OdmError {
    #[error("Failed to parse descriptor: {message}")]
    Parse { message: String },
    #[error("Invalid descriptor: {0}")]
    Validation(#[from] ValidationError),
    #[error("Acquiring license returned a {status} status: {body}")]
    Acquisition { status: u16, body: String },
    #[error("License token cannot be sent as a header: {message}")]
    InvalidLicense { message: String },
    #[error("Downloading {url} returned a {status} status")]
    Download { url: String, status: u16 },
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection timeout")]
    ConnectionTimeout,
    #[error("Response body error")]
    ResponseBodyError,
    #[error("URL decode error: {message:?}")]
    UrlDecodeError { message: String },
    #[error("Standard I/O error: {e}")]
    StdIoError { e: std::io::Error },
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
    #[error("CLI argument error: {message:?}")]
    CliError { message: String },
    #[error("Other error: {message:?}")]
    Other {
        message: String,
        origin: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Structural problems in a descriptor that decoded fine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected 1 format, got {0}")]
    FormatCount(usize),
    #[error("expected 1 protocol, got {0}")]
    ProtocolCount(usize),
    #[error("expected {declared} parts, got {actual}")]
    PartCountMismatch { declared: usize, actual: usize },
    #[error("unknown protocol method: {0}")]
    UnsupportedProtocol(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("segment `{segment}` of `{input}` is not a whole number")]
    InvalidSegment { input: String, segment: String },
    #[error("`{input}` has {count} segments, at most 4 are supported")]
    TooManySegments { input: String, count: usize },
    #[error("`{input}` is too large")]
    Overflow { input: String },
}

impl OdmError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for OdmError {
    fn from(e: reqwest::Error) -> Self {
        match e.source().and_then(|s| s.downcast_ref::<std::io::Error>()) {
            Some(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
                return Self::ConnectionTimeout;
            }
            _ => {}
        }

        match e.is_timeout() {
            true => Self::ConnectionTimeout,
            false if e.is_body() => Self::ResponseBodyError,
            false if e.is_connect() => Self::ConnectionClosed,
            false if e.is_builder() => Self::UrlDecodeError {
                message: e.to_string(),
            },
            _ => Self::Other {
                message: e.to_string(),
                origin: Box::new(e),
            },
        }
    }
}

impl From<reqwest_middleware::Error> for OdmError {
    fn from(value: reqwest_middleware::Error) -> Self {
        match value {
            reqwest_middleware::Error::Middleware(error) => Self::Other {
                message: error.to_string(),
                origin: error.into(),
            },
            reqwest_middleware::Error::Reqwest(error) => OdmError::from(error),
        }
    }
}

impl From<std::io::Error> for OdmError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError { e }
    }
}

impl From<quick_xml::Error> for OdmError {
    fn from(e: quick_xml::Error) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for OdmError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<quick_xml::DeError> for OdmError {
    fn from(e: quick_xml::DeError) -> Self {
        Self::parse(format!("metadata: {e}"))
    }
}

impl From<toml::de::Error> for OdmError {
    fn from(e: toml::de::Error) -> Self {
        Self::ConfigError {
            message: e.to_string(),
        }
    }
}

impl From<crate::job::JobBuilderError> for OdmError {
    fn from(e: crate::job::JobBuilderError) -> Self {
        Self::Other {
            message: e.to_string(),
            origin: Box::new(e),
        }
    }
}
