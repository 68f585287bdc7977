use thiserror::Error;

/// Error categories surfaced by estimation, simulation, and the stores.
///
/// `ModelNotFound` means "estimate first"; `DataUnavailable` means the
/// market source failed and the call can be retried.
#[derive(Debug, Error)]
pub enum MarkovError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("no fitted model for symbol {0}")]
    ModelNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("no stored simulations for symbol {0}")]
    NoSimulations(String),
}

impl MarkovError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unavailable(symbol: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }

    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArgument(_) => 2,
            Self::InsufficientData(_) => 3,
            Self::ModelNotFound(_) => 4,
            Self::NoSimulations(_) => 5,
            Self::DataUnavailable { .. } => 6,
            Self::Store(_) => 10,
        }
    }
}

impl From<sqlx::Error> for MarkovError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<csv::Error> for MarkovError {
    fn from(err: csv::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<std::io::Error> for MarkovError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarkovError>;
