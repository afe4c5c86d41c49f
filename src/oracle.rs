//! Native-currency balance lookup.
//!
//! [`BalanceOracle`] is the port the updater depends on. [`EthRpcOracle`]
//! implements it with a raw JSON-RPC `eth_getBalance` call against any
//! Ethereum-compatible endpoint (Infura by default).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::OracleError;
use crate::model::Address;

/// Default mainnet RPC endpoint.
pub const DEFAULT_RPC: &str = "https://mainnet.infura.io/v3/your-project-id";

/// Wei per ether, as a decimal scale.
const ETHER_DECIMALS: u32 = 18;

/// Source of truth for an address's current balance.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn get_balance(&self, address: &Address) -> Result<Decimal, OracleError>;
}

/// JSON-RPC balance oracle.
pub struct EthRpcOracle {
    rpc_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl EthRpcOracle {
    /// Create a new oracle with the given RPC URL.
    pub fn new(rpc_url: &str) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Create a new oracle against the default endpoint.
    pub fn default_rpc() -> Self {
        Self::new(DEFAULT_RPC)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Make a JSON-RPC call to the node.
    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, OracleError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let json: serde_json::Value = resp.json().await?;

        if let Some(error) = json.get("error") {
            return Err(OracleError::Rpc(error.to_string()));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| OracleError::InvalidResponse("missing result in RPC response".into()))
    }
}

#[async_trait]
impl BalanceOracle for EthRpcOracle {
    async fn get_balance(&self, address: &Address) -> Result<Decimal, OracleError> {
        let start = Instant::now();
        let result = self
            .rpc_call(
                "eth_getBalance",
                serde_json::json!([address.as_str(), "latest"]),
            )
            .await
            .and_then(|value| {
                let hex = value.as_str().ok_or_else(|| {
                    OracleError::InvalidResponse(format!("expected hex string, got {}", value))
                })?;
                wei_to_ether(parse_hex_u128(hex)?)
            });

        let duration_ms = start.elapsed().as_millis() as u64;
        crate::metrics::record_oracle_call(result.is_ok(), duration_ms);
        match &result {
            Ok(balance) => tracing::debug!(%address, %balance, duration_ms, "fetched balance"),
            Err(e) => tracing::warn!(%address, error = %e, duration_ms, "balance lookup failed"),
        }
        result
    }
}

/// Parse a 0x-prefixed hex quantity as u128.
fn parse_hex_u128(hex: &str) -> Result<u128, OracleError> {
    let clean = hex
        .strip_prefix("0x")
        .ok_or_else(|| OracleError::InvalidResponse(format!("missing 0x prefix: {}", hex)))?;
    if clean.is_empty() || clean.len() > 32 {
        return Err(OracleError::InvalidResponse(format!(
            "invalid hex quantity: {}",
            hex
        )));
    }
    u128::from_str_radix(clean, 16)
        .map_err(|e| OracleError::InvalidResponse(format!("invalid hex {}: {}", hex, e)))
}

/// Convert a wei amount to ether.
fn wei_to_ether(wei: u128) -> Result<Decimal, OracleError> {
    let wei = i128::try_from(wei)
        .map_err(|_| OracleError::InvalidResponse(format!("balance out of range: {}", wei)))?;
    Decimal::try_from_i128_with_scale(wei, ETHER_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|e| OracleError::InvalidResponse(format!("balance out of range: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u128("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u128("0xff").unwrap(), 255);
        assert_eq!(
            parse_hex_u128("0x1bc16d674ec80000").unwrap(),
            2_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_parse_hex_rejects() {
        assert!(parse_hex_u128("ff").is_err());
        assert!(parse_hex_u128("0x").is_err());
        assert!(parse_hex_u128("0xzz").is_err());
        assert!(parse_hex_u128(&format!("0x1{}", "0".repeat(32))).is_err());
    }

    #[test]
    fn test_wei_to_ether() {
        assert_eq!(wei_to_ether(0).unwrap(), Decimal::ZERO);
        assert_eq!(wei_to_ether(2_000_000_000_000_000_000).unwrap(), dec!(2));
        assert_eq!(wei_to_ether(1).unwrap(), dec!(0.000000000000000001));
        assert_eq!(
            wei_to_ether(1_500_000_000_000_000_000).unwrap().to_string(),
            "1.5"
        );
    }

    #[test]
    fn test_wei_to_ether_out_of_range() {
        assert!(wei_to_ether(u128::MAX).is_err());
    }
}
