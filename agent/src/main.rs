//! Verifiable-inference agent
//!
//! Runs a model, waits for the proof of that inference, verifies it, and
//! turns the prediction into a contract call:
//! 1. Verifiable inference on the model's deployment
//! 2. Proof fetch for the returned request id
//! 3. Proof verification and signer check
//! 4. Contract call carrying the prediction

use alloy::dyn_abi::FunctionExt;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verity_core::services::abi::{coerce_params, encode_calldata, find_function, load_abi, CallSpec};
use verity_core::services::api::ApiClient;
use verity_core::services::chain::{Account, ChainClient, EvmChainClient};
use verity_core::services::chains::resolve_contract;
use verity_core::services::proofs::ProofStore;
use verity_core::services::registry::RegistryClient;
use verity_core::services::verifier::{ProofVerifier, RemoteVerifier};
use verity_core::{
    register_model, AgentConfig, AgentError, InferenceAgent, InferenceRequest, InferenceResult,
    ModelIdentity, ModelSession, ModelSpec,
};

/// Placeholder argument replaced by the index of the largest model output.
const ARGMAX: &str = "{argmax}";

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Put verified model predictions on-chain")]
struct Cli {
    /// Configuration file (TOML); VERITY_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ModelArgs {
    /// Local ONNX model
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Remote model id
    #[arg(long)]
    model_id: Option<u64>,

    /// Remote model version
    #[arg(long)]
    version_id: Option<u64>,
}

#[derive(Args)]
struct CallArgs {
    /// ABI file (bare ABI array or build artifact)
    #[arg(long)]
    abi: PathBuf,

    /// Contract function to call
    #[arg(long)]
    function: String,

    /// Function arguments; `{argmax}` is replaced by the predicted class
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the model once
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        /// JSON file of named input tensors
        #[arg(short, long)]
        input: PathBuf,

        /// Run on the model's deployment and return a proof request id
        #[arg(long)]
        verifiable: bool,
    },

    /// Show the current workspace URL
    Workspace,

    /// Show the deployment URI of a model version
    Deployment {
        #[arg(long)]
        model_id: u64,

        #[arg(long)]
        version_id: u64,
    },

    /// Encode calldata for a contract function
    Calldata {
        #[command(flatten)]
        call: CallArgs,
    },

    /// Call the same read-only function on several contracts in one batch
    Read {
        /// Contract alias or address (repeatable)
        #[arg(long = "contract", required = true)]
        contracts: Vec<String>,

        #[command(flatten)]
        call: CallArgs,
    },

    /// Full pipeline: infer, fetch proof, verify, submit
    Run {
        #[arg(long)]
        model_id: u64,

        #[arg(long)]
        version_id: u64,

        /// JSON file of named input tensors
        #[arg(short, long)]
        input: PathBuf,

        /// Contract alias from the configuration, or an address
        #[arg(long)]
        contract: String,

        #[command(flatten)]
        call: CallArgs,
    },
}

/// Replaces `{argmax}` placeholders with the predicted class.
fn substitute(args: &[String], result: &InferenceResult) -> Result<Vec<String>, AgentError> {
    args.iter()
        .map(|arg| {
            if arg == ARGMAX {
                result
                    .output
                    .argmax()
                    .map(|i| i.to_string())
                    .ok_or_else(|| AgentError::Inference("model output is empty".into()))
            } else {
                Ok(arg.clone())
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verity_core=info,agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;

    let api = ApiClient::new(config.api.clone());
    let registry = RegistryClient::new(api.clone());

    match cli.command {
        Commands::Predict {
            model,
            input,
            verifiable,
        } => {
            let spec = ModelSpec {
                model_path: model.model_path,
                model_id: model.model_id,
                version_id: model.version_id,
                output_dir: Some(config.model_dir.clone()),
            };
            let session = ModelSession::open(&spec, Some(registry)).await?;
            let request = InferenceRequest::File(input);

            if verifiable {
                let result = session.run_verifiable(request).await?;
                println!("Result:     {}", result.output.to_json());
                println!("Request ID: {}", result.request_id);
            } else {
                let output = session.run(request)?;
                println!("Result: {}", output.to_json());
            }
        }

        Commands::Workspace => {
            println!("{}", registry.workspace_uri().await?);
        }

        Commands::Deployment {
            model_id,
            version_id,
        } => {
            let identity = ModelIdentity::new(model_id, version_id);
            match registry.deployment_uri(identity).await? {
                Some(uri) => println!("{}", uri),
                None => println!("No active deployment for {}", identity),
            }
        }

        Commands::Calldata { call } => {
            let abi = load_abi(&call.abi)?;
            let params = coerce_params(&abi, &call.function, &call.args)?;
            let calldata = encode_calldata(&abi, &call.function, &params)?;
            println!("0x{}", hex::encode(calldata));
        }

        Commands::Read { contracts, call } => {
            let abi = load_abi(&call.abi)?;
            let params = coerce_params(&abi, &call.function, &call.args)?;
            let calldata = encode_calldata(&abi, &call.function, &params)?;
            let function = find_function(&abi, &call.function, params.len())?;

            let account = Account::from_config(&config.chain)?;
            let chain = EvmChainClient::connect(&config.chain, &account).await?;
            let targets = contracts
                .iter()
                .map(|c| resolve_contract(&config.contracts, c))
                .collect::<Result<Vec<_>, _>>()?;

            let results = chain
                .read_many(targets.iter().map(|t| (*t, calldata.clone())).collect())
                .await?;

            println!("{:<44} {}", "Contract", "Result");
            println!("{}", "-".repeat(70));
            for (target, data) in targets.iter().zip(results) {
                let shown = match data {
                    Some(data) => {
                        let values = function
                            .abi_decode_output(&data, true)
                            .with_context(|| format!("cannot decode {} output", call.function))?;
                        format!("{:?}", values)
                    }
                    None => "reverted".to_string(),
                };
                println!("{:<44} {}", target, shown);
            }
        }

        Commands::Run {
            model_id,
            version_id,
            input,
            contract,
            call,
        } => {
            let identity = ModelIdentity::new(model_id, version_id);
            let contract = resolve_contract(&config.contracts, &contract)?;
            let abi = load_abi(&call.abi)?;
            find_function(&abi, &call.function, call.args.len())?;

            let session =
                ModelSession::open(&ModelSpec::remote(identity, &config.model_dir), Some(registry.clone())).await?;
            let account = Account::from_config(&config.chain)?;
            let chain = EvmChainClient::connect(&config.chain, &account).await?;
            tracing::info!("Agent account: {}", chain.account());

            let agent = InferenceAgent::new(
                session,
                ProofStore::new(registry),
                ProofVerifier::new(Arc::new(RemoteVerifier::new(api))),
                Arc::new(chain),
            )?;

            let action = register_model(identity, |result: &InferenceResult| {
                let args = substitute(&call.args, result)?;
                Ok(CallSpec {
                    contract,
                    abi: abi.clone(),
                    function: call.function.clone(),
                    params: coerce_params(&abi, &call.function, &args)?,
                })
            });

            let run = agent
                .run(InferenceRequest::File(input), &action, &account)
                .await
                .context("Pipeline aborted")?;

            println!("\n[$] TRANSACTION COMPLETE");
            println!("    Prediction: {}", run.result.output.to_json());
            println!("    Request ID: {}", run.result.request_id);
            println!("    TX Hash:    {:?}", run.receipt.tx_hash);
            println!(
                "    Block:      {}",
                run.receipt
                    .block_number
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "N/A".into())
            );
            println!("    Gas Used:   {}", run.receipt.gas_used);
        }
    }

    Ok(())
}
