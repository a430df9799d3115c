use thiserror::Error;

#[derive(Error, Debug)]
pub enum LigatureError {
    #[error("Transaction state error: {0}")]
    TransactionState(String),
    #[error("Read-only store: {0}")]
    ReadOnly(String),
    #[error("Concurrent write: {0}")]
    ConcurrentWrite(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid label: {0}")]
    InvalidLabel(String),
    #[error("No blank entity numbers left after {0}")]
    BlanksExhausted(u64),
    #[error("Store is closed")]
    Closed,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
}

pub type Result<T> = std::result::Result<T, LigatureError>;

impl LigatureError {
    pub fn transaction_state<T: Into<String>>(msg: T) -> Self {
        Self::TransactionState(msg.into())
    }
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn invalid_range<T: Into<String>>(msg: T) -> Self {
        Self::InvalidRange(msg.into())
    }
    pub fn invalid_label<T: Into<String>>(msg: T) -> Self {
        Self::InvalidLabel(msg.into())
    }
    pub fn corruption<T: Into<String>>(msg: T) -> Self {
        Self::DataCorruption {
            message: msg.into(),
        }
    }
}

// Helper conversions
impl From<rusqlite::Error> for LigatureError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<::config::ConfigError> for LigatureError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
