use sidecar_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("proxy update failed: {0}")]
    Update(#[source] anyhow::Error),

    #[error("ticker error: {0}")]
    Ticker(String),
}
