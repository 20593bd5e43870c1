use alloy_transport::TransportError;
use thiserror::Error;

/// Transient and permanent failures surfaced by the `chain` module's RPC
/// collaborators.
///
/// Per the bundler's error taxonomy, RPC failures are transient: callers in
/// [`crate::gas`] and [`crate::mempool`] log these and keep the previous
/// cached value rather than propagating them to their own callers.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error calling chain RPC: {0}")]
    Transport(#[from] TransportError),

    #[error("chain RPC returned no data for {0}")]
    MissingData(&'static str),

    #[error("gas station HTTP request failed: {0}")]
    GasStation(#[from] reqwest::Error),
}
