//! Utility types shared across the bundler components.
//!
//! - [`sig_down`] - graceful shutdown signal handling, used to cancel the
//!   gas-price refresh loop.

pub mod sig_down;

pub use sig_down::SigDown;
