use thiserror::Error;

/// Application-wide error type - single point of truth
///
/// Only aggregate outcomes live here. Failures of an individual chain-data
/// provider are [`ProviderError`]s and are logged inside the resolver; they
/// never reach a caller of the engine.
#[derive(Error, Debug)]
pub enum AppError {
    /// Every provider failed on every attempt
    #[error("Unable to reach chain data providers for {operation}; try again later")]
    ResolutionFailure { operation: String },

    /// Selection cannot cover outputs plus fee
    #[error("Insufficient funds to cover outputs and fees: have {available} sats, need {required} sats")]
    InsufficientFunds { available: u64, required: u64 },

    /// Payload does not fit the 16-bit length field
    #[error("Payload too large: {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// No valid curve point found within the attempt bound
    #[error("Could not embed data chunk as a public key after {attempts} attempts; retry the build")]
    PointEmbeddingExhausted { attempts: usize },

    /// Funding address is malformed or for the wrong network
    #[error("Invalid funding address {address}: {reason}")]
    InvalidFundingAddress { address: String, reason: String },

    /// Change, recipient or service-fee address is malformed
    #[error("Invalid {role} address {address}: {reason}")]
    InvalidAddress {
        role: String,
        address: String,
        reason: String,
    },

    /// Locking script is malformed or unusable
    #[error("Invalid script: {0}")]
    InvalidScript(String),

    /// A planned output would be rejected by relay policy as dust
    #[error("Output {index} value {value} sats is below its dust floor of {floor} sats")]
    DustOutput { index: usize, value: u64, floor: u64 },

    /// Fee rate must be a positive, finite number of sat/vB
    #[error("Invalid fee rate: {0} sat/vB")]
    InvalidFeeRate(f64),

    /// Data validation/parsing
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Transaction or PSBT construction
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration issues
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether retrying the same build later can succeed without caller changes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ResolutionFailure { .. } | AppError::PointEmbeddingExhausted { .. }
        )
    }
}

/// Errors raised by a single chain-data provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Request could not be sent or the connection dropped
    #[error("Network error: {0}")]
    Network(String),

    /// Provider answered with a non-2xx status
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// Body was not the JSON shape we expected
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Provider does not know the requested transaction or output
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request exceeded the configured timeout
    #[error("Request timeout after {timeout_seconds}s: {url}")]
    Timeout { timeout_seconds: u64, url: String },
}

/// Application-wide result type - single point of truth
pub type AppResult<T> = Result<T, AppError>;

/// Result type for single-provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidData(format!("JSON error: {}", err))
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<bitcoin::psbt::Error> for AppError {
    fn from(err: bitcoin::psbt::Error) -> Self {
        AppError::Transaction(format!("PSBT error: {}", err))
    }
}
