//! The `EvmRpc` trait: the chain read capabilities the gas-price manager and
//! mempool reconciliation depend on.

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::BlockNumberOrTag;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use super::error::ChainError;

/// A block's fee-relevant fields, as returned by `eth_getBlockByNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFeeInfo {
    pub base_fee_per_gas: Option<u128>,
    pub gas_used: u128,
    pub gas_limit: u128,
}

/// `estimateFeesPerGas`-style estimate: whichever fields the node could
/// supply. A missing field is derived by the gas-price manager rather than
/// defaulted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeEstimate {
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub gas_price: Option<u128>,
}

/// A single `eth_feeHistory` response, reduced to the fields the gas-price
/// manager's percentile fallback needs.
#[derive(Debug, Clone, Default)]
pub struct FeeHistory {
    pub base_fee_per_gas: Vec<u128>,
    pub reward: Vec<Vec<u128>>,
}

/// The chain read capabilities the bundler core needs: current gas price,
/// EIP-1559 fee estimate, fee history (for percentile-based priority-fee
/// fallback), and a batched nonce lookup against the EntryPoint's
/// `getNonce(sender, key)` used during mempool reconciliation.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn get_block_latest(&self) -> Result<BlockFeeInfo, ChainError>;

    async fn get_gas_price(&self) -> Result<u128, ChainError>;

    async fn estimate_fees_per_gas(&self) -> Result<FeeEstimate, ChainError>;

    async fn get_fee_history(
        &self,
        block_count: u64,
        reward_percentiles: &[f64],
    ) -> Result<FeeHistory, ChainError>;

    /// Batched `getNonce(sender, key)` lookup against the EntryPoint, one
    /// slot per `(sender, key)` pair, in order. A whole-batch failure is
    /// surfaced as `Err`; an individual pair's failure is reported as `None`
    /// in its slot rather than aborting the rest of the batch.
    async fn get_nonce_multicall(
        &self,
        entry_point: Address,
        accounts: &[(Address, U256)],
    ) -> Result<Vec<Option<U256>>, ChainError>;
}

alloy_sol_types::sol! {
    #[sol(rpc)]
    interface IEntryPointNonce {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// `alloy`-backed [`EvmRpc`] implementation: a plain read-only provider over
/// HTTP (no signer/filler stack, since this crate never submits transactions
/// itself).
pub struct AlloyEvmRpc<P: Provider> {
    provider: Arc<P>,
}

impl AlloyEvmRpc<alloy_provider::RootProvider> {
    pub fn connect_http(url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(url);
        Self {
            provider: Arc::new(provider),
        }
    }
}

#[async_trait]
impl<P: Provider> EvmRpc for AlloyEvmRpc<P> {
    async fn get_block_latest(&self) -> Result<BlockFeeInfo, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or(ChainError::MissingData("latest block"))?;
        Ok(BlockFeeInfo {
            base_fee_per_gas: block.header.base_fee_per_gas.map(u128::from),
            gas_used: u128::from(block.header.gas_used),
            gas_limit: u128::from(block.header.gas_limit),
        })
    }

    async fn get_gas_price(&self) -> Result<u128, ChainError> {
        let price = self.provider.get_gas_price().await?;
        Ok(price)
    }

    async fn estimate_fees_per_gas(&self) -> Result<FeeEstimate, ChainError> {
        match self.provider.estimate_eip1559_fees().await {
            Ok(estimate) => Ok(FeeEstimate {
                max_fee_per_gas: Some(estimate.max_fee_per_gas),
                max_priority_fee_per_gas: Some(estimate.max_priority_fee_per_gas),
                gas_price: None,
            }),
            Err(err) => {
                warn!(error = %err, "eip1559 fee estimate failed, falling back to priority-fee-only");
                let tip = self.provider.get_max_priority_fee_per_gas().await?;
                Ok(FeeEstimate {
                    max_fee_per_gas: None,
                    max_priority_fee_per_gas: Some(tip),
                    gas_price: None,
                })
            }
        }
    }

    async fn get_fee_history(
        &self,
        block_count: u64,
        reward_percentiles: &[f64],
    ) -> Result<FeeHistory, ChainError> {
        let history = self
            .provider
            .get_fee_history(block_count, BlockNumberOrTag::Latest, reward_percentiles)
            .await?;
        Ok(FeeHistory {
            base_fee_per_gas: history.base_fee_per_gas.into_iter().map(u128::from).collect(),
            reward: history.reward.unwrap_or_default(),
        })
    }

    async fn get_nonce_multicall(
        &self,
        entry_point: Address,
        accounts: &[(Address, U256)],
    ) -> Result<Vec<Option<U256>>, ChainError> {
        let contract = IEntryPointNonce::new(entry_point, &*self.provider);
        let mut nonces = Vec::with_capacity(accounts.len());
        for (sender, key) in accounts {
            let key192 = alloy_primitives::aliases::U192::from(*key);
            match contract.getNonce(*sender, key192).call().await {
                Ok(nonce) => nonces.push(Some(nonce)),
                Err(err) => {
                    warn!(%sender, %key, error = %err, "getNonce call failed, skipping pair");
                    nonces.push(None);
                }
            }
        }
        Ok(nonces)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Hand-rolled mock of [`EvmRpc`] for gas-price and mempool tests.
    #[derive(Default)]
    pub struct MockEvmRpc {
        pub base_fee_per_gas: Mutex<Option<u128>>,
        pub gas_used: Mutex<u128>,
        pub gas_limit: Mutex<u128>,
        pub gas_price: Mutex<u128>,
        pub fee_estimate: Mutex<FeeEstimate>,
        pub fee_history: Mutex<FeeHistory>,
        pub nonces: Mutex<Vec<Option<U256>>>,
    }

    #[async_trait]
    impl EvmRpc for MockEvmRpc {
        async fn get_block_latest(&self) -> Result<BlockFeeInfo, ChainError> {
            Ok(BlockFeeInfo {
                base_fee_per_gas: *self.base_fee_per_gas.lock().unwrap(),
                gas_used: *self.gas_used.lock().unwrap(),
                gas_limit: *self.gas_limit.lock().unwrap(),
            })
        }

        async fn get_gas_price(&self) -> Result<u128, ChainError> {
            Ok(*self.gas_price.lock().unwrap())
        }

        async fn estimate_fees_per_gas(&self) -> Result<FeeEstimate, ChainError> {
            Ok(*self.fee_estimate.lock().unwrap())
        }

        async fn get_fee_history(
            &self,
            _block_count: u64,
            _reward_percentiles: &[f64],
        ) -> Result<FeeHistory, ChainError> {
            Ok(self.fee_history.lock().unwrap().clone())
        }

        async fn get_nonce_multicall(
            &self,
            _entry_point: Address,
            accounts: &[(Address, U256)],
        ) -> Result<Vec<Option<U256>>, ChainError> {
            let nonces = self.nonces.lock().unwrap();
            Ok(accounts
                .iter()
                .enumerate()
                .map(|(i, _)| nonces.get(i).copied().unwrap_or(None))
                .collect())
        }
    }
}
