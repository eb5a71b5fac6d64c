use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Status(u16),
    Unauthorized,
    InvalidResponse(String),
    Json(serde_json::Error),
    NoResources,
    AllHostsFailed,
    InvalidHost(String),
    DuplicateHost(String),
    Config(String),
    Io(std::io::Error),
}

impl Error {
    /// Whether the fetcher should retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Status(s) => crate::fetch::RETRY_STATUS_CODES.contains(s),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Status(s) => write!(f, "error communicating with API: {s}"),
            Error::Unauthorized => write!(f, "invalid authentication"),
            Error::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::NoResources => write!(f, "no resources configured"),
            Error::AllHostsFailed => write!(f, "failed to fetch data from any resource"),
            Error::InvalidHost(host) => write!(f, "invalid IP or hostname: {host}"),
            Error::DuplicateHost(host) => write!(f, "host already configured: {host}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
