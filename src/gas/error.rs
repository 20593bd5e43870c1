use thiserror::Error;

/// Errors the [`crate::gas::GasPriceManager`]'s public contract can return.
///
/// Transient RPC failures during a refresh are logged and swallowed rather
/// than propagated — these variants are reserved for data-absent and
/// precondition failures a caller must react to.
#[derive(Debug, Error)]
pub enum GasPriceError {
    #[error("no base fee has been observed yet for this chain")]
    BaseFeeUnavailable,

    #[error(
        "gas price too low: need at least maxFeePerGas={minimum_max_fee}, \
         maxPriorityFeePerGas={minimum_priority_fee}"
    )]
    GasPriceTooLow {
        minimum_max_fee: u128,
        minimum_priority_fee: u128,
    },
}
