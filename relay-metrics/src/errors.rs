use relay_dispatch::DispatchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Log sink error: {0}")]
    LogSink(String),

    #[error("Log stream lagged behind by {0} records")]
    Lagged(u64),

    #[error("Invalid filter pattern: {0}")]
    Pattern(String),

    #[error("Invalid alarm configuration: {0}")]
    InvalidAlarm(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}
