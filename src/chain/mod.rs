//! Chain RPC and CAIP-ish chain plumbing.
//!
//! - [`chain_id`] — [`ChainId`] and [`ChainType`], the chain-specific
//!   fee/bump behavior selector.
//! - [`rpc`] — the [`rpc::EvmRpc`] trait and its `alloy`-backed
//!   implementation.
//! - [`gas_station`] — the Polygon gas station HTTP client.
//! - [`error`] — [`error::ChainError`].

pub mod chain_id;
pub mod error;
pub mod gas_station;
pub mod rpc;

pub use chain_id::{ChainId, ChainType};
pub use error::ChainError;
pub use gas_station::PolygonGasStation;
pub use rpc::{AlloyEvmRpc, BlockFeeInfo, EvmRpc, FeeEstimate, FeeHistory};
