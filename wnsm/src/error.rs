use thiserror::Error;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure, unexpected HTTP status or a response without the expected keys.
    ///
    /// Try again later: the next scheduled cycle is the retry.
    #[error("{message}")]
    Connection {
        message: String,

        #[source]
        source: Option<reqwest::Error>,
    },

    /// Bad credentials or a login flow of an unexpected shape.
    #[error("{0}")]
    Login(String),

    #[error("not logged in, call `login()` first")]
    NotLoggedIn,

    /// The access token has expired, a new login is required.
    #[error("access token is not valid anymore, please re-log")]
    AccessTokenExpired,

    #[error(transparent)]
    Query(#[from] QueryError),

    /// The backend answered with an exception payload instead of data.
    #[error("backend reported an exception at `{endpoint}`: {exception}")]
    Backend { endpoint: String, exception: serde_json::Value },

    #[error("unit `{0}` is not yet implemented, please report it")]
    UnsupportedUnit(String),

    #[error("installation type `{0}` is not yet implemented, please report it")]
    UnsupportedInstallationType(String),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("statistics store failed: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    pub fn store(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Store(error.into())
    }

    /// Wrap a transport error and keep it as the source.
    pub(crate) fn transport(message: impl Into<String>) -> impl FnOnce(reqwest::Error) -> Self {
        let message = message.into();
        move |source| Self::Connection { message, source: Some(source) }
    }
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        let message =
            if source.is_timeout() { "request timed out" } else { "request failed" }.to_owned();
        Self::Connection { message, source: Some(source) }
    }
}

/// Response integrity violations. They fail the current call and leave the session intact.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Returned data does not match given zaehlpunkt! (expected `{expected}`, got `{actual}`)")]
    MeteringPointMismatch { expected: String, actual: String },

    #[error("No valid OBIS code found. OBIS codes in data: {found:?}")]
    NoValidObisCode { found: Vec<String> },

    #[error("returned data does not contain any zaehlwerke")]
    NoMeasurementChannels,

    /// Movement data is not available (yet) for the requested range.
    #[error("historical data is empty")]
    EmptyDataset,

    #[error("no metering points found for the logged-in user")]
    NoMeteringPoints,

    #[error("metering point `{0}` not found")]
    MeteringPointNotFound(String),
}
