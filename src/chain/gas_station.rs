//! Client for the Polygon gas station v2 HTTP endpoint, preferred over
//! `eth_maxPriorityFeePerGas` for `ChainType::Polygon` and
//! `ChainType::PolygonMumbai`.

use serde::Deserialize;
use url::Url;

use super::error::ChainError;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GasStationTier {
    #[serde(rename = "maxPriorityFee")]
    pub max_priority_fee_gwei: f64,
    #[serde(rename = "maxFee")]
    pub max_fee_gwei: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GasStationResponse {
    pub fast: GasStationTier,
}

/// `reqwest`-backed client for `https://gasstation.polygon.technology/v2` and
/// its Mumbai/Amoy equivalents.
#[derive(Debug, Clone)]
pub struct PolygonGasStation {
    client: reqwest::Client,
    endpoint: Url,
}

impl PolygonGasStation {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Fetches the "fast" tier tip and max fee, in wei.
    pub async fn fetch_fast_tier(&self) -> Result<(u128, u128), ChainError> {
        let response: GasStationResponse =
            self.client.get(self.endpoint.clone()).send().await?.json().await?;
        let gwei_to_wei = |gwei: f64| (gwei * 1_000_000_000.0).round() as u128;
        Ok((
            gwei_to_wei(response.fast.max_priority_fee_gwei),
            gwei_to_wei(response.fast.max_fee_gwei),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gas_station_response_shape() {
        let body = r#"{"fast":{"maxPriorityFee":30.5,"maxFee":120.25}}"#;
        let parsed: GasStationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.fast.max_priority_fee_gwei, 30.5);
        assert_eq!(parsed.fast.max_fee_gwei, 120.25);
    }
}
