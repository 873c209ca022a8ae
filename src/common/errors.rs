/// Convenient result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds the download and mux pipeline can surface.
///
/// `Network` is the only transient kind (the segment fetcher retries it);
/// everything else aborts the current run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid episode filter: {0}")]
    FilterSyntax(String),

    #[error("no episodes are left after applying the url filter")]
    EmptyAfterFilter,

    #[error("resolution {0} is not available")]
    NoMatchingResolution(String),

    #[error("no variant available for audio '{0}'")]
    NoMatchingVariant(String),

    #[error("no subtitle available for '{0}'")]
    NoMatchingSubtitle(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("segment decryption failed: {0}")]
    Decrypt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("muxer exited with an error:\n{stderr}")]
    MuxerFailed { stderr: String },

    #[error("session is expired, please re-login")]
    AuthExpired,

    #[error("'{0}' is not available with your account")]
    NotAvailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid output template: {0}")]
    Template(String),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}
