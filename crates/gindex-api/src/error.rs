use thiserror::Error;

/// Errors from the remote index client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, timeout or protocol failure that outlived the transport retries.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 429/503 responses outlived the backoff budget.
    #[error("rate limited by {endpoint} after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    /// 5xx responses outlived the backoff and failover budget.
    #[error("server error (status {status}) from {endpoint}")]
    Server { endpoint: String, status: u16 },

    #[error("auth error: {0}")]
    Auth(String),

    #[error("unexpected response shape: {0}")]
    ResponseShape(String),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("no endpoints configured")]
    NoEndpoints,
}
