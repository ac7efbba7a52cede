use anyhow::{Context, Result};

use std::env;
use std::str::FromStr;

use crate::blockchain::{Address, Wallet};

// Development fallbacks so a node comes up with no environment at all.
// Anything real overrides these.
const DEFAULT_PRIVATE_KEY: &str =
    "9b7f3e51c0d8a6412f5e88b3a7c4d90e6f1b2a3c4d5e6f708192a3b4c5d6e7f8";
const DEFAULT_MINT_PRIVATE_KEY: &str =
    "1a2b3c4d5e6f708192a3b4c5d6e7f8091b2c3d4e5f60718293a4b5c6d7e8f901";

/// Process configuration, sourced from the environment with hard-coded
/// fallback defaults.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the peer-gossip listener binds to (`P2P_PORT`)
    pub p2p_port: u16,

    /// Port the HTTP API binds to (`API_PORT`)
    pub api_port: u16,

    /// Comma-separated seed peer addresses (`PEERS`)
    pub peers: Vec<String>,

    /// The address this node advertises in handshakes (`PUBLIC_ADDRESS`)
    pub public_address: String,

    /// This node's wallet secret, hex (`PRIVATE_KEY`)
    pub private_key: String,

    /// The mint authority's secret, hex (`MINT_PRIVATE_KEY`)
    pub mint_private_key: String,

    /// Recipient of the genesis issuance (`GENESIS_ADDRESS`); defaults to
    /// this node's own wallet address
    pub genesis_address: Option<String>,

    /// Worker threads for the proof-of-work search (`MINER_THREADS`)
    pub miner_threads: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        let p2p_port = env_or("P2P_PORT", "3000")
            .parse()
            .context("P2P_PORT must be a port number")?;
        let api_port = env_or("API_PORT", "8080")
            .parse()
            .context("API_PORT must be a port number")?;

        let peers = env::var("PEERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|address| !address.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let public_address = env_or("PUBLIC_ADDRESS", "127.0.0.1:3000");
        let private_key = env_or("PRIVATE_KEY", DEFAULT_PRIVATE_KEY);
        let mint_private_key = env_or("MINT_PRIVATE_KEY", DEFAULT_MINT_PRIVATE_KEY);
        let genesis_address = env::var("GENESIS_ADDRESS").ok();

        let miner_threads = env_or("MINER_THREADS", "1")
            .parse()
            .context("MINER_THREADS must be a positive integer")?;

        Ok(NodeConfig {
            p2p_port,
            api_port,
            peers,
            public_address,
            private_key,
            mint_private_key,
            genesis_address,
            miner_threads,
        })
    }

    /// This node's wallet
    pub fn wallet(&self) -> Result<Wallet> {
        Wallet::from_hex(&self.private_key).context("PRIVATE_KEY is not a valid secret key")
    }

    /// The mint authority's wallet
    pub fn mint_wallet(&self) -> Result<Wallet> {
        Wallet::from_hex(&self.mint_private_key)
            .context("MINT_PRIVATE_KEY is not a valid secret key")
    }

    /// Recipient of the genesis issuance; the node's own wallet when not
    /// configured.
    pub fn premine_address(&self) -> Result<Address> {
        match &self.genesis_address {
            Some(address) => {
                Address::from_str(address).context("GENESIS_ADDRESS is not a valid address")
            }
            None => Ok(self.wallet()?.address().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_produce_a_working_config() {
        let config = NodeConfig {
            p2p_port: 3000,
            api_port: 8080,
            peers: Vec::new(),
            public_address: "127.0.0.1:3000".to_string(),
            private_key: DEFAULT_PRIVATE_KEY.to_string(),
            mint_private_key: DEFAULT_MINT_PRIVATE_KEY.to_string(),
            genesis_address: None,
            miner_threads: 1,
        };

        let wallet = config.wallet().unwrap();
        let mint = config.mint_wallet().unwrap();

        assert_ne!(wallet.address(), mint.address());
        assert_eq!(config.premine_address().unwrap(), *wallet.address());
    }
}
