//! Accounts and contract calls on an EVM chain, using Alloy

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, Signature},
    providers::{Provider, ProviderBuilder},
    rpc::types::eth::TransactionRequest,
    signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
    signers::SignerSync,
    sol,
};
use async_trait::async_trait;
use reqwest::Url;
use tracing::info;

use crate::config::ChainConfig;
use crate::error::{AgentError, Result};
use crate::models::{ProofMetadata, TransactionReceipt};
use crate::services::chains::{supports_multicall, Network, MULTICALL3_ADDRESS};

sol! {
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
    }
}

/// Signing account used both to attest proofs and to pay for transactions.
#[derive(Clone, Debug)]
pub struct Account {
    signer: PrivateKeySigner,
}

impl Account {
    pub fn from_private_key(key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|_| AgentError::config("Invalid private key"))?;
        Ok(Self { signer })
    }

    /// First account (index 0) derived from a BIP-39 phrase.
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.trim())
            .index(0u32)
            .and_then(|builder| builder.build())
            .map_err(|e| AgentError::config(format!("Invalid mnemonic: {}", e)))?;
        Ok(Self { signer })
    }

    /// Exactly one of `private_key` and `mnemonic` must be configured.
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        match (&config.private_key, &config.mnemonic) {
            (Some(key), None) => Self::from_private_key(key),
            (None, Some(phrase)) => Self::from_mnemonic(phrase),
            (Some(_), Some(_)) => Err(AgentError::config(
                "configure either chain.private_key or chain.mnemonic, not both",
            )),
            (None, None) => Err(AgentError::config("no account configured (chain.private_key or chain.mnemonic)")),
        }
    }

    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// EIP-191 personal signature over the proof's canonical bytes.
    pub fn sign_proof(&self, proof: &ProofMetadata) -> Result<Signature> {
        self.signer
            .sign_message_sync(&proof.canonical_bytes())
            .map_err(|e| AgentError::VerificationFailed(format!("cannot sign proof: {}", e)))
    }

    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

/// Produces the signature the pipeline checks against the chain account
/// before anything is submitted.
pub trait ProofSigner: Send + Sync {
    fn sign_proof(&self, proof: &ProofMetadata) -> Result<Signature>;
}

impl ProofSigner for Account {
    fn sign_proof(&self, proof: &ProofMetadata) -> Result<Signature> {
        Account::sign_proof(self, proof)
    }
}

/// Address that produced `signature` over `proof`.
pub fn recover_signer(proof: &ProofMetadata, signature: &Signature) -> Result<Address> {
    signature
        .recover_address_from_msg(proof.canonical_bytes())
        .map_err(|e| AgentError::VerificationFailed(format!("cannot recover signer: {}", e)))
}

/// Contract-call submission for a single chain and account.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address that signs and pays for submitted transactions.
    fn account(&self) -> Address;

    /// Sends `calldata` to `contract` and waits for the receipt. A receipt
    /// reporting on-chain failure is returned, not raised.
    async fn submit(&self, contract: Address, calldata: Bytes) -> Result<TransactionReceipt>;
}

pub struct EvmChainClient {
    rpc_url: Url,
    wallet: EthereumWallet,
    account: Address,
    network: Network,
    chain_id: u64,
}

impl EvmChainClient {
    /// Connects to `config.rpc_url` and checks that it serves the configured
    /// network.
    pub async fn connect(config: &ChainConfig, account: &Account) -> Result<Self> {
        let network: Network = config.network.parse()?;
        let expected = network.chain_id()?;
        let rpc_url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| AgentError::config(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;

        let provider = ProviderBuilder::new().on_http(rpc_url.clone());
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| AgentError::Rpc(format!("eth_chainId failed: {}", e)))?;
        if chain_id != expected {
            return Err(AgentError::config(format!(
                "RPC {} serves chain {}, but {} is chain {}",
                config.rpc_url, chain_id, network, expected
            )));
        }

        info!("Connected to {} (chain {}) as {}", network, chain_id, account.address());
        Ok(Self {
            rpc_url,
            wallet: account.wallet(),
            account: account.address(),
            network,
            chain_id,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Batches read-only calls through Multicall3. Each entry is the call's
    /// return data, or `None` if that call reverted.
    pub async fn read_many(&self, calls: Vec<(Address, Bytes)>) -> Result<Vec<Option<Bytes>>> {
        if !supports_multicall(self.chain_id) {
            return Err(AgentError::config(format!(
                "Multicall3 is not available on chain {}",
                self.chain_id
            )));
        }

        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let multicall = IMulticall3::new(MULTICALL3_ADDRESS, &provider);
        let calls: Vec<IMulticall3::Call3> = calls
            .into_iter()
            .map(|(target, data)| IMulticall3::Call3 {
                target,
                allowFailure: true,
                callData: data,
            })
            .collect();

        let results = multicall
            .aggregate3(calls)
            .call()
            .await
            .map_err(|e| AgentError::Rpc(format!("aggregate3 failed: {}", e)))?
            .returnData;

        Ok(results
            .into_iter()
            .map(|r| r.success.then_some(r.returnData))
            .collect())
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit(&self, contract: Address, calldata: Bytes) -> Result<TransactionReceipt> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.clone());

        info!(
            "Executing contract call: contract={}, from={}, calldata_len={}",
            contract,
            self.account,
            calldata.len()
        );

        let tx = TransactionRequest::default()
            .with_from(self.account)
            .with_to(contract)
            .with_input(calldata);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| AgentError::SubmissionFailed {
                contract: contract.to_string(),
                reason: format!("Send failed: {}", e),
            })?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| AgentError::SubmissionFailed {
                contract: contract.to_string(),
                reason: format!("Confirmation failed: {}", e),
            })?;

        info!(
            "Transaction mined: tx={:?}, status={}",
            receipt.transaction_hash,
            if receipt.status() { "success" } else { "failed" }
        );

        Ok(TransactionReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used as u128,
            failed: !receipt.status(),
        })
    }
}
