//! The inference → proof → verification → transmission pipeline

use alloy::primitives::Signature;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{AgentError, PipelineError, Result, Stage};
use crate::models::{InferenceRequest, InferenceResult, ModelIdentity, ProofMetadata, TransactionReceipt};
use crate::services::abi::CallSpec;
use crate::services::chain::{recover_signer, ChainClient, ProofSigner};
use crate::services::proofs::ProofStore;
use crate::services::verifier::ProofVerifier;
use crate::session::{ModelHandle, ModelSession};

/// Where a pipeline run currently stands. Runs only move forward.
#[derive(Debug)]
enum PipelineState {
    Idle(InferenceRequest),
    Inferred(InferenceResult),
    ProofFetched {
        result: InferenceResult,
        proof: ProofMetadata,
    },
    Verified {
        result: InferenceResult,
        proof: ProofMetadata,
    },
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle(_) => "idle",
            PipelineState::Inferred(_) => "inferred",
            PipelineState::ProofFetched { .. } => "proof fetched",
            PipelineState::Verified { .. } => "verified",
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: InferenceResult,
    pub proof: ProofMetadata,
    pub receipt: TransactionReceipt,
}

/// Puts the result of a verified model inference on-chain.
///
/// Each run is independent: the agent keeps no state between runs, so
/// callers may drive several runs concurrently. Nothing is retried; running
/// again with the same input submits a new transaction.
pub struct InferenceAgent {
    session: ModelSession,
    identity: ModelIdentity,
    proofs: ProofStore,
    verifier: ProofVerifier,
    chain: Arc<dyn ChainClient>,
}

impl InferenceAgent {
    /// `session` must have been opened from a remote identity.
    pub fn new(
        session: ModelSession,
        proofs: ProofStore,
        verifier: ProofVerifier,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        let identity = session.identity().ok_or_else(|| {
            AgentError::config("the agent needs a model opened by id and version, not from a local path")
        })?;
        Ok(Self {
            session,
            identity,
            proofs,
            verifier,
            chain,
        })
    }

    pub fn identity(&self) -> ModelIdentity {
        self.identity
    }

    /// Runs the whole pipeline. `action` turns the inference result into
    /// the contract call to make and must be registered for this agent's
    /// model. `signer` signs the fetched proof; its signature must recover
    /// to the chain client's account or nothing is submitted.
    pub async fn run<F>(
        &self,
        request: InferenceRequest,
        action: &ModelHandle<F>,
        signer: &dyn ProofSigner,
    ) -> Result<PipelineRun, PipelineError>
    where
        F: Fn(&InferenceResult) -> Result<CallSpec>,
    {
        if action.identity() != self.identity {
            return Err(PipelineError {
                stage: Stage::Inference,
                source: AgentError::config(format!(
                    "action is registered for {}, agent runs {}",
                    action.identity(),
                    self.identity
                )),
            });
        }

        let mut state = PipelineState::Idle(request);
        loop {
            state = match state {
                PipelineState::Idle(request) => PipelineState::Inferred(self.infer(request).await?),
                PipelineState::Inferred(result) => {
                    let proof = self.fetch_proof(&result).await?;
                    PipelineState::ProofFetched { result, proof }
                }
                PipelineState::ProofFetched { result, proof } => {
                    let signature = signer
                        .sign_proof(&proof)
                        .map_err(PipelineError::at(Stage::Verification))?;
                    self.verify(&proof, &signature).await?;
                    PipelineState::Verified { result, proof }
                }
                PipelineState::Verified { result, proof } => {
                    let call = action
                        .call(&result)
                        .map_err(PipelineError::at(Stage::Transmission))?;
                    let receipt = self.submit(&call).await?;
                    info!("Pipeline submitted: tx={:?}", receipt.tx_hash);
                    return Ok(PipelineRun { result, proof, receipt });
                }
            };
            info!("Pipeline state: {}", state.name());
        }
    }

    /// Runs verifiable inference on the model's deployment.
    pub async fn infer(&self, request: InferenceRequest) -> Result<InferenceResult, PipelineError> {
        self.session
            .run_verifiable(request)
            .await
            .map_err(PipelineError::at(Stage::Inference))
    }

    /// Fetches the proof for an inference that has already run.
    pub async fn fetch_proof(&self, result: &InferenceResult) -> Result<ProofMetadata, PipelineError> {
        self.proofs
            .fetch(self.identity, &result.request_id)
            .await
            .map_err(PipelineError::at(Stage::ProofFetch))
    }

    /// Checks the proof, then checks that `signature` over it was made by the
    /// account that will send the transaction. Both must pass.
    pub async fn verify(&self, proof: &ProofMetadata, signature: &Signature) -> Result<(), PipelineError> {
        let fail = |msg: String| PipelineError {
            stage: Stage::Verification,
            source: AgentError::VerificationFailed(msg),
        };

        if !self.verifier.verify(proof, self.identity).await {
            return Err(fail(format!("proof for {} is not valid", self.identity)));
        }

        let expected = self.chain.account();
        let signer = recover_signer(proof, signature).map_err(PipelineError::at(Stage::Verification))?;
        if signer != expected {
            error!("Proof signed by {}, expected {}", signer, expected);
            return Err(fail(format!("proof signed by {}, expected {}", signer, expected)));
        }
        Ok(())
    }

    /// Verifies a proof with a caller-supplied signature, then submits `call`.
    pub async fn transmit(
        &self,
        proof: &ProofMetadata,
        signature: &Signature,
        call: &CallSpec,
    ) -> Result<TransactionReceipt, PipelineError> {
        self.verify(proof, signature).await?;
        self.submit(call).await
    }

    async fn submit(&self, call: &CallSpec) -> Result<TransactionReceipt, PipelineError> {
        let calldata = call.calldata().map_err(PipelineError::at(Stage::Transmission))?;
        let receipt = self
            .chain
            .submit(call.contract, calldata)
            .await
            .map_err(PipelineError::at(Stage::Transmission))?;
        if receipt.failed {
            return Err(PipelineError {
                stage: Stage::Transmission,
                source: AgentError::SubmissionFailed {
                    contract: call.contract.to_string(),
                    reason: format!("{} reverted in tx {:?}", call.function, receipt.tx_hash),
                },
            });
        }
        Ok(receipt)
    }
}
