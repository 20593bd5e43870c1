//! EVM chain identifiers and the chain-specific fee bump/floor rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric EIP-155 chain id (e.g. `1` for Ethereum mainnet, `137` for Polygon).
///
/// Mirrors the `eip155:<reference>` CAIP-2 namespace, but this crate only ever
/// deals with the EVM family so the namespace prefix itself is not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eip155:{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reference = s.strip_prefix("eip155:").unwrap_or(s);
        reference.parse().map(ChainId)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Selects the chain-specific gas-price bump and fee-source rules a
/// [`crate::gas::GasPriceManager`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainType {
    #[default]
    Default,
    Polygon,
    PolygonMumbai,
    Celo,
    CeloAlfajores,
    Dfk,
    Avalanche,
    Arbitrum,
    Hedera,
}

const POLYGON_PRIORITY_FLOOR_WEI: u128 = 31_000_000_000;
const MUMBAI_PRIORITY_FLOOR_WEI: u128 = 1_000_000_000;
const DFK_FLOOR_WEI: u128 = 5_000_000_000;
const AVALANCHE_FLOOR_WEI: u128 = 1_500_000_000;

impl ChainType {
    /// Applies the configured percentage bump (`bump_pct / 100`, e.g. `120`
    /// for +20%) to both fee fields, then this chain's floor and flattening
    /// overrides:
    ///
    /// - `maxPriorityFeePerGas` is floored at 31 gwei on Polygon, 1 gwei on
    ///   Polygon Mumbai.
    /// - `maxFeePerGas` is floored at the (possibly just-floored) priority
    ///   fee.
    /// - Celo and Celo Alfajores then flatten both fields to their max.
    /// - DFK floors both fields at 5 gwei, Avalanche at 1.5 gwei.
    pub fn bump_and_floor(self, bump_pct: u64, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> (u128, u128) {
        let mut max_fee = max_fee_per_gas * bump_pct as u128 / 100;
        let mut max_priority_fee = max_priority_fee_per_gas * bump_pct as u128 / 100;

        let priority_floor = match self {
            ChainType::Polygon => Some(POLYGON_PRIORITY_FLOOR_WEI),
            ChainType::PolygonMumbai => Some(MUMBAI_PRIORITY_FLOOR_WEI),
            _ => None,
        };
        if let Some(floor) = priority_floor {
            max_priority_fee = max_priority_fee.max(floor);
        }
        max_fee = max_fee.max(max_priority_fee);

        match self {
            ChainType::Celo | ChainType::CeloAlfajores => {
                let flat = max_fee.max(max_priority_fee);
                max_fee = flat;
                max_priority_fee = flat;
            }
            ChainType::Dfk => {
                max_fee = max_fee.max(DFK_FLOOR_WEI);
                max_priority_fee = max_priority_fee.max(DFK_FLOOR_WEI);
            }
            ChainType::Avalanche => {
                max_fee = max_fee.max(AVALANCHE_FLOOR_WEI);
                max_priority_fee = max_priority_fee.max(AVALANCHE_FLOOR_WEI);
            }
            _ => {}
        }
        (max_fee, max_priority_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_parses_bare_and_caip2() {
        assert_eq!(ChainId::from_str("1").unwrap(), ChainId::new(1));
        assert_eq!(ChainId::from_str("eip155:137").unwrap(), ChainId::new(137));
    }

    #[test]
    fn chain_id_displays_as_caip2() {
        assert_eq!(ChainId::new(8453).to_string(), "eip155:8453");
    }

    #[test]
    fn polygon_bump_floor_s3() {
        // S3: bump = 120, gas station fast tier 50/40 gwei.
        let (max_fee, priority) =
            ChainType::Polygon.bump_and_floor(120, 50_000_000_000, 40_000_000_000);
        assert_eq!(priority, 48_000_000_000);
        assert_eq!(max_fee, 60_000_000_000);
    }

    #[test]
    fn polygon_priority_floor_overrides_low_bump_result() {
        let (_, priority) = ChainType::Polygon.bump_and_floor(100, 5_000_000_000, 10_000_000_000);
        assert_eq!(priority, POLYGON_PRIORITY_FLOOR_WEI);
    }

    #[test]
    fn celo_flattens_to_max_of_both_fields_s4() {
        // S4: post-bump maxFee = 10 gwei, maxPriorityFee = 12 gwei on Celo.
        let (max_fee, priority) = ChainType::Celo.bump_and_floor(100, 10_000_000_000, 12_000_000_000);
        assert_eq!(max_fee, 12_000_000_000);
        assert_eq!(priority, 12_000_000_000);
    }

    #[test]
    fn dfk_and_avalanche_floor_both_fields() {
        let (max_fee, priority) = ChainType::Dfk.bump_and_floor(100, 1_000_000_000, 1_000_000_000);
        assert_eq!(max_fee, DFK_FLOOR_WEI);
        assert_eq!(priority, DFK_FLOOR_WEI);

        let (max_fee, priority) = ChainType::Avalanche.bump_and_floor(100, 1_000_000_000, 1_000_000_000);
        assert_eq!(max_fee, AVALANCHE_FLOOR_WEI);
        assert_eq!(priority, AVALANCHE_FLOOR_WEI);
    }

    #[test]
    fn default_chain_has_no_floor() {
        let (max_fee, priority) = ChainType::default().bump_and_floor(150, 100, 50);
        assert_eq!(max_fee, 150);
        assert_eq!(priority, 75);
    }
}
