//! Model registry, deployment and workspace lookups

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::{AgentError, Result};
use crate::models::{
    CairoRunRequest, CairoRunResponse, Deployment, DownloadLink, ModelIdentity, ModelVersion,
    TensorMap, VersionStatus, Workspace,
};
use crate::services::api::ApiClient;

#[derive(Clone, Debug)]
pub struct RegistryClient {
    api: ApiClient,
}

impl RegistryClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn get_version(&self, identity: ModelIdentity) -> Result<ModelVersion> {
        let url = self.api.endpoint(&[
            "models",
            &identity.model_id.to_string(),
            "versions",
            &identity.version_id.to_string(),
        ])?;
        self.api.get_json("model registry", url).await
    }

    /// Fetches the original artifact of `identity`. Returns a configuration
    /// error without downloading anything unless the version is `COMPLETED`.
    pub async fn download_original(&self, identity: ModelIdentity) -> Result<(ModelVersion, Vec<u8>)> {
        let version = self.get_version(identity).await?;
        if version.status != VersionStatus::Completed {
            return Err(AgentError::config(format!(
                "{} is not ready: status is {}",
                identity, version.status
            )));
        }

        info!("Model version is completed, downloading {}", identity);
        let url = self.api.endpoint(&[
            "models",
            &identity.model_id.to_string(),
            "versions",
            &format!("{}:download_original", version.version),
        ])?;
        let link: DownloadLink = self.api.get_json("model registry", url).await?;
        let bytes = self.api.download("model registry", &link.download_url).await?;
        Ok((version, bytes))
    }

    /// Downloads the artifact into `dir`, named after the registry's original
    /// file name, and returns the written path.
    pub async fn save_original(&self, identity: ModelIdentity, dir: &Path) -> Result<PathBuf> {
        let (version, bytes) = self.download_original(identity).await?;
        let name = version
            .original_model_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("model_{}_{}.onnx", identity.model_id, identity.version_id));

        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        std::fs::write(&path, &bytes)?;
        info!(
            "Model saved at {} ({} bytes, sha256 {})",
            path.display(),
            bytes.len(),
            hex::encode(Sha256::digest(&bytes))
        );
        Ok(path)
    }

    pub async fn list_deployments(&self, identity: ModelIdentity) -> Result<Vec<Deployment>> {
        let url = self.api.endpoint(&[
            "models",
            &identity.model_id.to_string(),
            "versions",
            &identity.version_id.to_string(),
            "deployments",
        ])?;
        self.api.get_json("deployments api", url).await
    }

    /// URI of the first deployment of `identity`, or `None` when the version
    /// has no deployment.
    pub async fn deployment_uri(&self, identity: ModelIdentity) -> Result<Option<String>> {
        let deployments = self.list_deployments(identity).await?;
        Ok(deployments.into_iter().next().map(|d| d.uri))
    }

    /// URL of the caller's current workspace.
    pub async fn workspace_uri(&self) -> Result<String> {
        let url = self.api.endpoint(&["workspaces"])?;
        match self.api.get_json::<Workspace>("workspace api", url).await {
            Ok(workspace) => Ok(workspace.url),
            Err(e) => {
                error!("Failed to retrieve workspace: {}", e);
                error!("Please check that a workspace has been created for this account");
                Err(e)
            }
        }
    }

    /// Runs a verifiable inference on a deployment.
    pub async fn cairo_run(&self, deployment_uri: &str, inputs: &TensorMap) -> Result<CairoRunResponse> {
        let url = format!("{}/cairo_run", deployment_uri.trim_end_matches('/'))
            .parse()
            .map_err(|e| AgentError::config(format!("invalid deployment uri {}: {}", deployment_uri, e)))?;
        let body = CairoRunRequest {
            args: inputs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
        };
        self.api.post_json("deployment", url, &body).await
    }
}
