//! Core components of an ERC-4337 bundler: a user-operation mempool, a
//! chain-aware gas-price manager, and an executor sender-wallet arbiter.
//!
//! This crate is consumed by an external JSON-RPC server and bundling
//! driver; it owns no network listener of its own. A driver holds one
//! [`mempool::Mempool`], [`gas::GasPriceManager`], and [`sender::SenderManager`]
//! per `(entryPoint, chain)` pair it serves.
//!
//! # Modules
//!
//! - [`chain`] — chain RPC abstraction and the Polygon gas station client.
//! - [`config`] — typed configuration, loaded from a JSON file.
//! - [`gas`] — the gas-price manager.
//! - [`mempool`] — the user-operation mempool and reconciliation.
//! - [`sender`] — the executor wallet-pool arbiter.
//! - [`util`] — graceful-shutdown signal handling.

pub mod chain;
pub mod config;
pub mod gas;
pub mod mempool;
pub mod sender;
pub mod util;
