//! Proof metadata retrieval

use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::models::{ModelIdentity, ProofMetadata};
use crate::services::api::reject_unless;
use crate::services::registry::RegistryClient;

/// Fetches the proof issued for a verifiable inference.
///
/// Every call is a fresh round trip: the deployment is resolved again and the
/// proof is requested once. Nothing is retried or cached.
#[derive(Clone, Debug)]
pub struct ProofStore {
    registry: RegistryClient,
}

impl ProofStore {
    pub fn new(registry: RegistryClient) -> Self {
        Self { registry }
    }

    pub async fn fetch(&self, identity: ModelIdentity, request_id: &str) -> Result<ProofMetadata> {
        let uri = self
            .registry
            .deployment_uri(identity)
            .await?
            .ok_or_else(|| AgentError::config(format!("no active deployment for {}", identity)))?;

        let api = self.registry.api();
        let url = api.endpoint(&[
            "models",
            &identity.model_id.to_string(),
            "versions",
            &identity.version_id.to_string(),
            "deployments",
            &uri,
            "proofs",
            request_id,
        ])?;

        info!("Fetching proof for request {} of {}", request_id, identity);
        let resp = api.send("proof api", api.get(url)).await?;
        let resp = reject_unless("proof api", resp, |s| s == reqwest::StatusCode::OK).await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(AgentError::unavailable("proof api"))?;
        let proof: ProofMetadata = serde_json::from_str(&body).map_err(|e| {
            warn!("Proof for request {} is not JSON: {}", request_id, e);
            AgentError::RemoteRejected {
                service: "proof api",
                status,
                body: body.clone(),
            }
        })?;
        debug!("Proof metadata: {}", proof.0);
        Ok(proof)
    }
}
