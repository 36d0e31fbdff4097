//! Configuration management

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_HOST: &str = "https://api.gizatech.xyz";

/// Top-level configuration, owned by the caller and handed to each client.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentConfig {
    pub api: ApiConfig,
    pub chain: ChainConfig,
    /// Contract aliases, e.g. `mnist = "0x1780..."`.
    #[serde(default)]
    pub contracts: HashMap<String, String>,
    /// Where downloaded model artifacts are written.
    pub model_dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub token: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChainConfig {
    /// `ecosystem:network[:provider]`, e.g. `ethereum:sepolia:geth`.
    pub network: String,
    pub rpc_url: String,
    pub private_key: Option<String>,
    pub mnemonic: Option<String>,
}

impl AgentConfig {
    /// Layers defaults, an optional TOML file and `VERITY_*` environment
    /// variables (nested keys joined with `__`, e.g. `VERITY_API__TOKEN`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("api.host", DEFAULT_API_HOST)?
            .set_default("chain.network", "ethereum:sepolia")?
            .set_default("chain.rpc_url", "https://ethereum-sepolia-rpc.publicnode.com")?
            .set_default("model_dir", ".")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(
                Environment::with_prefix("VERITY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}

impl ApiConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: None,
            api_key: None,
        }
    }

    pub fn with_credentials(mut self, token: Option<String>, api_key: Option<String>) -> Self {
        self.token = token;
        self.api_key = api_key;
        self
    }
}
