//! Static chain lookup data

use alloy::primitives::{address, Address};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AgentError, Result};

/// Canonical Multicall3 deployment, identical on every supported chain.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Chain ids where Multicall3 is deployed at [`MULTICALL3_ADDRESS`].
pub const MULTICALL3_CHAINS: &[u64] = &[
    1, 42, 4, 5, 3, 11155111, 10, 69, 420, 42161, 421613, 421611, 137, 80001, 100, 43114, 43113,
    4002, 250, 56, 97, 1284, 1285, 1287, 1666600000, 25, 122, 14, 19, 16, 114, 288, 1313161554,
    592, 66, 128, 1088, 30, 31, 9001, 9000, 108, 18, 42262, 42220, 44787, 71402, 71401, 8217,
    2001, 321, 106, 40,
];

pub fn supports_multicall(chain_id: u64) -> bool {
    MULTICALL3_CHAINS.contains(&chain_id)
}

const NETWORKS: &[(&str, &str, u64)] = &[
    ("ethereum", "mainnet", 1),
    ("ethereum", "sepolia", 11155111),
    ("ethereum", "holesky", 17000),
    ("ethereum", "local", 1337),
    ("arbitrum", "mainnet", 42161),
    ("arbitrum", "sepolia", 421614),
    ("optimism", "mainnet", 10),
    ("optimism", "sepolia", 11155420),
    ("base", "mainnet", 8453),
    ("base", "sepolia", 84532),
    ("polygon", "mainnet", 137),
    ("polygon", "amoy", 80002),
    ("avalanche", "mainnet", 43114),
    ("bsc", "mainnet", 56),
];

/// `ecosystem:network[:provider]`, e.g. `ethereum:sepolia:geth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub ecosystem: String,
    pub network: String,
    pub provider: Option<String>,
}

impl Network {
    pub fn chain_id(&self) -> Result<u64> {
        NETWORKS
            .iter()
            .find(|(eco, net, _)| *eco == self.ecosystem && *net == self.network)
            .map(|(_, _, id)| *id)
            .ok_or_else(|| AgentError::config(format!("unknown network {}", self)))
    }
}

impl FromStr for Network {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':').map(str::trim);
        let ecosystem = parts.next().filter(|p| !p.is_empty());
        let network = parts.next().filter(|p| !p.is_empty());
        let provider = parts.next().filter(|p| !p.is_empty()).map(str::to_lowercase);
        match (ecosystem, network, parts.next()) {
            (Some(eco), Some(net), None) => Ok(Network {
                ecosystem: eco.to_lowercase(),
                network: net.to_lowercase(),
                provider,
            }),
            _ => Err(AgentError::config(format!(
                "invalid network {:?}, expected ecosystem:network[:provider]",
                s
            ))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.network)?;
        if let Some(provider) = &self.provider {
            write!(f, ":{}", provider)?;
        }
        Ok(())
    }
}

/// Resolves a contract reference: a literal address or an alias from
/// `contracts`.
pub fn resolve_contract(contracts: &HashMap<String, String>, reference: &str) -> Result<Address> {
    if let Ok(address) = reference.parse::<Address>() {
        return Ok(address);
    }
    let raw = contracts
        .get(reference)
        .ok_or_else(|| AgentError::config(format!("unknown contract {:?}", reference)))?;
    raw.parse()
        .map_err(|_| AgentError::config(format!("contract {:?} has invalid address {}", reference, raw)))
}
