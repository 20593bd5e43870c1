use thiserror::Error;

/// Errors from the [`crate::sender::SenderManager`]'s public contract.
#[derive(Debug, Error)]
pub enum SenderError {
    #[error("no executor private keys configured")]
    NoWalletsConfigured,

    #[error("wallet pool exhausted: all wallets are currently leased")]
    WalletPoolExhausted,

    #[error("shared wallet queue backend error: {0}")]
    Backend(#[from] redis::RedisError),
}
