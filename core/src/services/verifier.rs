//! Fail-closed proof verification

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{ModelIdentity, ProofMetadata};
use crate::services::api::ApiClient;

/// External routine that checks a proof against a model identity.
///
/// `Ok(true)` is the only outcome treated as valid.
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    async fn verify(&self, proof: &ProofMetadata, identity: ModelIdentity) -> anyhow::Result<bool>;
}

/// Wraps a backend so that every error, and every panic, reads as "invalid".
#[derive(Clone)]
pub struct ProofVerifier {
    backend: Arc<dyn VerificationBackend>,
}

impl ProofVerifier {
    pub fn new(backend: Arc<dyn VerificationBackend>) -> Self {
        Self { backend }
    }

    pub async fn verify(&self, proof: &ProofMetadata, identity: ModelIdentity) -> bool {
        let backend = Arc::clone(&self.backend);
        let proof = proof.clone();
        let task = tokio::spawn(async move { backend.verify(&proof, identity).await });

        match task.await {
            Ok(Ok(valid)) => {
                info!("Proof verification for {}: {}", identity, if valid { "valid" } else { "invalid" });
                valid
            }
            Ok(Err(e)) => {
                error!("An error occurred when verifying: {:#}", e);
                false
            }
            Err(e) => {
                error!("Verifier aborted: {}", e);
                false
            }
        }
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    proof: &'a ProofMetadata,
}

#[derive(Deserialize)]
struct VerifyResponse {
    verification: bool,
}

/// Verification performed by the platform's verify endpoint.
pub struct RemoteVerifier {
    api: ApiClient,
}

impl RemoteVerifier {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl VerificationBackend for RemoteVerifier {
    async fn verify(&self, proof: &ProofMetadata, identity: ModelIdentity) -> anyhow::Result<bool> {
        let url = self.api.endpoint(&[
            "models",
            &identity.model_id.to_string(),
            "versions",
            &identity.version_id.to_string(),
            "verify",
        ])?;
        let resp: VerifyResponse = self
            .api
            .post_json("verify api", url, &VerifyRequest { proof })
            .await?;
        Ok(resp.verification)
    }
}
