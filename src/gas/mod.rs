//! The gas-price manager: chain-aware EIP-1559 fee tracking, periodic
//! refresh, and the bump/validation rules a bundler applies before accepting
//! or rebroadcasting a user operation.

pub mod error;
pub mod history;

pub use error::GasPriceError;
use history::GasPriceHistory;

use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chain::{ChainError, ChainType, EvmRpc, PolygonGasStation};

/// The fee a caller should use for a new or replacement user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPrice {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Tuning knobs for the refresh cadence, fee bump, and legacy-transaction
/// behavior.
#[derive(Debug, Clone)]
pub struct GasPriceManagerConfig {
    /// Percentage multiplier applied to both fee fields, e.g. `120` for +20%.
    /// Must be at least `100` (no discount below the oracle-observed value).
    pub gas_price_bump: u64,
    /// Maximum number of entries retained per fee history queue.
    pub gas_price_expiry: usize,
    /// How often the background refresh task polls the chain. `0` disables
    /// background caching: every read recomputes the fee pair inline.
    pub gas_price_refresh_interval: Duration,
    /// Force legacy (`gasPrice`) transactions even on an EIP-1559 chain.
    pub legacy_transactions: bool,
    pub chain_type: ChainType,
}

impl Default for GasPriceManagerConfig {
    fn default() -> Self {
        Self {
            gas_price_bump: 100,
            gas_price_expiry: 600,
            gas_price_refresh_interval: Duration::from_secs(10),
            legacy_transactions: false,
            chain_type: ChainType::Default,
        }
    }
}

const MAIN_SLICE_WIDTH: Duration = Duration::from_millis(1_000);
const ARBITRUM_SLICE_WIDTH: Duration = Duration::from_millis(15_000);
/// Sentinel "unbounded" value reported by the Arbitrum max-fee accessors when
/// their queue is empty.
const UNBOUNDED_FEE: u128 = u128::MAX;
const HEDERA_VALIDATION_SCALE: u128 = 1_000_000_000;

struct ArbitrumHistories {
    l1_base_fee: GasPriceHistory,
    l2_base_fee: GasPriceHistory,
}

struct Histories {
    base_fee: GasPriceHistory,
    max_fee: GasPriceHistory,
    max_priority_fee: GasPriceHistory,
    arbitrum: Option<ArbitrumHistories>,
}

/// Tracks recent gas prices for one `(entryPoint, chain)` pair and exposes
/// the bump/validate contract a bundling driver needs.
pub struct GasPriceManager<R: EvmRpc> {
    rpc: Arc<R>,
    gas_station: Option<PolygonGasStation>,
    config: GasPriceManagerConfig,
    histories: RwLock<Histories>,
}

impl<R: EvmRpc> GasPriceManager<R> {
    pub fn new(rpc: Arc<R>, gas_station: Option<PolygonGasStation>, config: GasPriceManagerConfig) -> Self {
        let queue_size = config.gas_price_expiry;
        let arbitrum = matches!(config.chain_type, ChainType::Arbitrum).then(|| ArbitrumHistories {
            l1_base_fee: GasPriceHistory::new(queue_size, ARBITRUM_SLICE_WIDTH, true),
            l2_base_fee: GasPriceHistory::new(queue_size, ARBITRUM_SLICE_WIDTH, true),
        });
        Self {
            rpc,
            gas_station,
            config,
            histories: RwLock::new(Histories {
                base_fee: GasPriceHistory::new(queue_size, MAIN_SLICE_WIDTH, false),
                max_fee: GasPriceHistory::new(queue_size, MAIN_SLICE_WIDTH, false),
                max_priority_fee: GasPriceHistory::new(queue_size, MAIN_SLICE_WIDTH, false),
                arbitrum,
            }),
        }
    }

    /// Spawns the background refresh loop, returning when `cancellation`
    /// fires. A zero refresh interval disables background caching entirely:
    /// every accessor recomputes inline instead, so this returns immediately.
    pub async fn run_refresh_loop(self: Arc<Self>, cancellation: CancellationToken) {
        if self.config.gas_price_refresh_interval.is_zero() {
            debug!("gas price refresh interval is zero, caching disabled, no background loop");
            return;
        }
        let mut interval = tokio::time::interval(self.config.gas_price_refresh_interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    debug!("gas price refresh loop cancelled");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.refresh_once(Instant::now()).await {
                        warn!(error = %err, "gas price refresh failed, keeping previous values");
                    }
                }
            }
        }
    }

    async fn refresh_once(&self, now: Instant) -> Result<(), ChainError> {
        let block = self.rpc.get_block_latest().await?;
        let (max_fee, max_priority_fee) = self
            .compute_fee_pair(block.base_fee_per_gas, block.gas_used, block.gas_limit)
            .await?;

        {
            let mut histories = self.histories.write().unwrap();
            if let Some(base_fee) = block.base_fee_per_gas {
                histories.base_fee.insert(now, base_fee);
            }
            histories.max_fee.insert(now, max_fee);
            histories.max_priority_fee.insert(now, max_priority_fee);
        }

        if matches!(self.config.chain_type, ChainType::Arbitrum) {
            let l2_base_fee = block.base_fee_per_gas.unwrap_or(0);
            let l1_base_fee = self.rpc.get_gas_price().await.unwrap_or(0);
            self.save_l2_base_fee(l2_base_fee);
            self.save_l1_base_fee(l1_base_fee);
        }

        debug!(max_fee, max_priority_fee, "gas price refreshed");
        Ok(())
    }

    /// Computes the next `(maxFeePerGas, maxPriorityFeePerGas)` pair by
    /// source precedence: the Polygon gas station first (when configured),
    /// then a forced legacy scalar, then the chain's EIP-1559 estimate with
    /// missing fields derived. The chain's bump and floor rules are applied
    /// to whichever pair is selected.
    async fn compute_fee_pair(
        &self,
        base_fee: Option<u128>,
        gas_used: u128,
        gas_limit: u128,
    ) -> Result<(u128, u128), ChainError> {
        if matches!(self.config.chain_type, ChainType::Polygon | ChainType::PolygonMumbai) {
            if let Some(station) = &self.gas_station {
                match station.fetch_fast_tier().await {
                    Ok((priority, max_fee)) => {
                        return Ok(self.config.chain_type.bump_and_floor(self.config.gas_price_bump, max_fee, priority));
                    }
                    Err(err) => {
                        warn!(error = %err, "gas station request failed, falling through to on-chain estimate");
                    }
                }
            }
        }

        if self.config.legacy_transactions {
            let scalar = match self.rpc.estimate_fees_per_gas().await {
                Ok(estimate) => match estimate.gas_price {
                    Some(price) => price,
                    None => self.rpc.get_gas_price().await?,
                },
                Err(_) => self.rpc.get_gas_price().await?,
            };
            return Ok(self.config.chain_type.bump_and_floor(self.config.gas_price_bump, scalar, scalar));
        }

        let estimate = self.rpc.estimate_fees_per_gas().await?;

        let mut priority_fee = match estimate.max_priority_fee_per_gas {
            Some(p) => p,
            None => {
                self.fee_history_percentile_fallback(estimate.max_fee_per_gas.unwrap_or(UNBOUNDED_FEE))
                    .await?
            }
        };
        let max_fee = match estimate.max_fee_per_gas {
            Some(f) => f,
            None => {
                let base_fee = base_fee.ok_or(ChainError::MissingData("base_fee_per_gas"))?;
                next_base_fee(base_fee, gas_used, gas_limit) + priority_fee
            }
        };
        if priority_fee == 0 {
            priority_fee = max_fee / 200;
        }

        Ok(self.config.chain_type.bump_and_floor(self.config.gas_price_bump, max_fee, priority_fee))
    }

    /// 20th-percentile reward over the last 10 blocks, arithmetic mean,
    /// capped at `cap`.
    async fn fee_history_percentile_fallback(&self, cap: u128) -> Result<u128, ChainError> {
        let history = self.rpc.get_fee_history(10, &[20.0]).await?;
        let rewards: Vec<u128> = history.reward.into_iter().filter_map(|r| r.first().copied()).collect();
        if rewards.is_empty() {
            return Ok(0);
        }
        let mean = rewards.iter().sum::<u128>() / rewards.len() as u128;
        Ok(mean.min(cap))
    }

    async fn refresh_if_empty(&self, select: impl Fn(&Histories) -> &GasPriceHistory) -> Result<(), GasPriceError> {
        let empty = select(&self.histories.read().unwrap()).is_empty();
        if empty || self.config.gas_price_refresh_interval.is_zero() {
            self.refresh_once(Instant::now())
                .await
                .map_err(|_| GasPriceError::BaseFeeUnavailable)?;
        }
        Ok(())
    }

    /// The current recommended pair: recomputed inline if caching is
    /// disabled (`gas_price_refresh_interval == 0`) or no sample has landed
    /// yet, otherwise the most recently stored pair.
    pub async fn get_gas_price(&self) -> Result<GasPrice, GasPriceError> {
        self.refresh_if_empty(|h| &h.max_fee).await?;
        let histories = self.histories.read().unwrap();
        Ok(GasPrice {
            max_fee_per_gas: histories.max_fee.latest().ok_or(GasPriceError::BaseFeeUnavailable)?,
            max_priority_fee_per_gas: histories
                .max_priority_fee
                .latest()
                .ok_or(GasPriceError::BaseFeeUnavailable)?,
        })
    }

    /// The most recently observed base fee. Fails with `BaseFeeUnavailable`
    /// on a chain forced into legacy transactions, since base fee is not
    /// tracked there.
    pub async fn get_base_fee(&self) -> Result<u128, GasPriceError> {
        if self.config.legacy_transactions {
            return Err(GasPriceError::BaseFeeUnavailable);
        }
        self.refresh_if_empty(|h| &h.base_fee).await?;
        self.histories
            .read()
            .unwrap()
            .base_fee
            .latest()
            .ok_or(GasPriceError::BaseFeeUnavailable)
    }

    pub async fn get_max_base_fee_per_gas(&self) -> Result<u128, GasPriceError> {
        self.refresh_if_empty(|h| &h.base_fee).await?;
        self.histories.read().unwrap().base_fee.max().ok_or(GasPriceError::BaseFeeUnavailable)
    }

    pub async fn get_min_max_fee_per_gas(&self) -> Result<u128, GasPriceError> {
        self.refresh_if_empty(|h| &h.max_fee).await?;
        self.histories.read().unwrap().max_fee.min().ok_or(GasPriceError::BaseFeeUnavailable)
    }

    pub async fn get_min_max_priority_fee_per_gas(&self) -> Result<u128, GasPriceError> {
        self.refresh_if_empty(|h| &h.max_priority_fee).await?;
        self.histories
            .read()
            .unwrap()
            .max_priority_fee
            .min()
            .ok_or(GasPriceError::BaseFeeUnavailable)
    }

    pub fn save_l1_base_fee(&self, value: u128) {
        if let Some(arb) = self.histories.write().unwrap().arbitrum.as_mut() {
            arb.l1_base_fee.insert(Instant::now(), value);
        }
    }

    pub fn save_l2_base_fee(&self, value: u128) {
        if let Some(arb) = self.histories.write().unwrap().arbitrum.as_mut() {
            arb.l2_base_fee.insert(Instant::now(), value);
        }
    }

    pub fn get_min_l1_base_fee(&self) -> u128 {
        self.histories
            .read()
            .unwrap()
            .arbitrum
            .as_ref()
            .and_then(|a| a.l1_base_fee.min())
            .unwrap_or(1)
    }

    pub fn get_max_l1_base_fee(&self) -> u128 {
        self.histories
            .read()
            .unwrap()
            .arbitrum
            .as_ref()
            .and_then(|a| a.l1_base_fee.max())
            .unwrap_or(UNBOUNDED_FEE)
    }

    pub fn get_max_l2_base_fee(&self) -> u128 {
        self.histories
            .read()
            .unwrap()
            .arbitrum
            .as_ref()
            .and_then(|a| a.l2_base_fee.max())
            .unwrap_or(UNBOUNDED_FEE)
    }

    /// Rejects a caller-supplied fee pair that falls below the current
    /// window's minimum for either field. Hedera compares against the window
    /// minima scaled down by 10⁹.
    pub async fn validate_gas_price(
        &self,
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    ) -> Result<(), GasPriceError> {
        let min_max_fee = self.get_min_max_fee_per_gas().await?;
        let min_priority_fee = self.get_min_max_priority_fee_per_gas().await?;
        let (min_max_fee, min_priority_fee) = if matches!(self.config.chain_type, ChainType::Hedera) {
            (min_max_fee / HEDERA_VALIDATION_SCALE, min_priority_fee / HEDERA_VALIDATION_SCALE)
        } else {
            (min_max_fee, min_priority_fee)
        };
        if max_fee_per_gas < min_max_fee || max_priority_fee_per_gas < min_priority_fee {
            return Err(GasPriceError::GasPriceTooLow {
                minimum_max_fee: min_max_fee,
                minimum_priority_fee: min_priority_fee,
            });
        }
        Ok(())
    }
}

/// The base fee a block could reach on its very next increase: `u == T` holds
/// it steady, `u > T` applies the EIP-1559 step capped at a 1-wei minimum
/// increase, `u < T` applies the symmetric decrease. `T = gasLimit / 2`.
fn next_base_fee(base_fee: u128, gas_used: u128, gas_limit: u128) -> u128 {
    let target = gas_limit / 2;
    if target == 0 || gas_used == target {
        return base_fee;
    }
    if gas_used > target {
        let delta = (base_fee * (gas_used - target) / target / 8).max(1);
        base_fee + delta
    } else {
        base_fee - (base_fee * (target - gas_used) / target / 8)
    }
}
