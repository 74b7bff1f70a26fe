use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to parse JSON response for {}: {source}", batch_label(.batch))]
    ResponseParse {
        batch: Option<u32>,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response shape for {}: {reason}", batch_label(.batch))]
    ResponseShape { batch: Option<u32>, reason: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by API: {0}")]
    RateLimited(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Batch number the failure is attributed to, if any
    pub fn batch(&self) -> Option<u32> {
        match self {
            Error::ResponseParse { batch, .. } | Error::ResponseShape { batch, .. } => *batch,
            _ => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}

fn batch_label(batch: &Option<u32>) -> String {
    match batch {
        Some(n) => format!("batch {}", n),
        None => "response".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
