//! Model sessions: where a model comes from and how it is run

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AgentError, Result};
use crate::models::{InferenceRequest, InferenceResult, ModelIdentity, Tensor, TensorMap};
use crate::services::registry::RegistryClient;

/// A loaded numeric model.
pub trait InferenceRuntime: Send + Sync {
    /// Runs the model, returning its outputs in graph order.
    fn run(&self, inputs: &TensorMap) -> Result<Vec<Tensor>>;
}

/// Turns a model file on disk into a runnable model.
pub trait RuntimeLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceRuntime>>;
}

/// Loads ONNX files with tract.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxLoader;

impl RuntimeLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceRuntime>> {
        Ok(Box::new(TractRuntime::from_path(path)?))
    }
}

pub struct TractRuntime {
    plan: tract_onnx::prelude::TypedRunnableModel<tract_onnx::prelude::TypedModel>,
    input_names: Vec<String>,
}

impl TractRuntime {
    pub fn from_path(path: &Path) -> Result<Self> {
        use tract_onnx::prelude::*;

        let load_err = |e: TractError| AgentError::Inference(format!("cannot load {}: {}", path.display(), e));
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        let input_names = plan
            .model()
            .input_outlets()
            .map_err(load_err)?
            .iter()
            .map(|outlet| plan.model().node(outlet.node).name.clone())
            .collect();

        info!("Model ready for inference: {}", path.display());
        Ok(Self { plan, input_names })
    }
}

impl InferenceRuntime for TractRuntime {
    fn run(&self, inputs: &TensorMap) -> Result<Vec<Tensor>> {
        use tract_onnx::prelude::{tract_ndarray, tvec, TValue, TVec};

        let single = self.input_names.len() == 1 && inputs.len() == 1;
        let mut values: TVec<TValue> = tvec!();
        for name in &self.input_names {
            let tensor = inputs
                .get(name)
                .or_else(|| if single { inputs.values().next() } else { None })
                .ok_or_else(|| AgentError::Inference(format!("missing model input {:?}", name)))?;
            let array = tract_ndarray::ArrayD::from_shape_vec(
                tract_ndarray::IxDyn(&tensor.shape),
                tensor.data.clone(),
            )
            .map_err(|e| AgentError::Inference(format!("input {}: {}", name, e)))?;
            values.push(tract_onnx::prelude::Tensor::from(array).into());
        }

        let outputs = self
            .plan
            .run(values)
            .map_err(|e| AgentError::Inference(e.to_string()))?;

        outputs
            .iter()
            .map(|value| {
                let view = value
                    .to_array_view::<f32>()
                    .map_err(|e| AgentError::Inference(format!("non-f32 output: {}", e)))?;
                Ok(Tensor {
                    shape: view.shape().to_vec(),
                    data: view.iter().copied().collect(),
                })
            })
            .collect()
    }
}

/// Where a session's model comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Remote(ModelIdentity),
}

/// Raw construction parameters, as they arrive from a caller or CLI.
#[derive(Debug, Clone, Default)]
pub struct ModelSpec {
    pub model_path: Option<PathBuf>,
    pub model_id: Option<u64>,
    pub version_id: Option<u64>,
    /// Download directory for remote artifacts.
    pub output_dir: Option<PathBuf>,
}

impl ModelSpec {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn remote(identity: ModelIdentity, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_id: Some(identity.model_id),
            version_id: Some(identity.version_id),
            output_dir: Some(output_dir.into()),
            ..Self::default()
        }
    }

    /// A local path, or a complete `(model_id, version_id)` pair, never both.
    pub fn source(&self) -> Result<ModelSource> {
        match (&self.model_path, self.model_id, self.version_id) {
            (Some(path), None, None) => Ok(ModelSource::Local(path.clone())),
            (None, Some(model_id), Some(version_id)) => {
                Ok(ModelSource::Remote(ModelIdentity::new(model_id, version_id)))
            }
            (None, None, None) => Err(AgentError::config(
                "Either model_path or id and version must be provided",
            )),
            (None, _, _) => Err(AgentError::config("Both id and version must be provided")),
            (Some(_), _, _) => Err(AgentError::config(
                "Either model_path or id and version must be provided, not both",
            )),
        }
    }
}

/// A runnable model, optionally tied to a remote identity.
pub struct ModelSession {
    runtime: Box<dyn InferenceRuntime>,
    identity: Option<ModelIdentity>,
    registry: Option<RegistryClient>,
}

impl ModelSession {
    pub async fn open(spec: &ModelSpec, registry: Option<RegistryClient>) -> Result<Self> {
        Self::open_with(spec, registry, &OnnxLoader).await
    }

    /// Validates `spec`, fetches the artifact if it is remote, and loads it
    /// with `loader`.
    pub async fn open_with(
        spec: &ModelSpec,
        registry: Option<RegistryClient>,
        loader: &dyn RuntimeLoader,
    ) -> Result<Self> {
        match spec.source()? {
            ModelSource::Local(path) => Ok(Self {
                runtime: loader.load(&path)?,
                identity: None,
                registry,
            }),
            ModelSource::Remote(identity) => {
                let client = registry
                    .as_ref()
                    .filter(|r| r.api().has_credentials())
                    .ok_or_else(|| {
                        AgentError::config(format!("API credentials are required to fetch {}", identity))
                    })?;
                let dir = spec.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
                let path = client.save_original(identity, &dir).await?;
                Ok(Self {
                    runtime: loader.load(&path)?,
                    identity: Some(identity),
                    registry,
                })
            }
        }
    }

    pub fn identity(&self) -> Option<ModelIdentity> {
        self.identity
    }

    /// Plain inference on the loaded model; no network access.
    pub fn run(&self, request: InferenceRequest) -> Result<Tensor> {
        let inputs = request.into_tensors()?;
        self.runtime
            .run(&inputs)?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Inference("model produced no outputs".into()))
    }

    /// Inference on the model's deployment, which issues a request id for
    /// the proof. Needs a remote identity; never falls back to [`run`].
    ///
    /// [`run`]: ModelSession::run
    pub async fn run_verifiable(&self, request: InferenceRequest) -> Result<InferenceResult> {
        let identity = self.identity.ok_or_else(|| {
            AgentError::config("Verifiable inference requires a model id and version, not a local model path")
        })?;
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| AgentError::config("Verifiable inference requires API access"))?;
        let uri = registry
            .deployment_uri(identity)
            .await?
            .ok_or_else(|| AgentError::config(format!("no active deployment for {}", identity)))?;

        let inputs = request.into_tensors()?;
        let response = registry.cairo_run(&uri, &inputs).await?;
        let output = Tensor::from_json(&response.result)?;
        info!("Inference saved! Result: {:?}, request id: {}", output.data, response.request_id);
        Ok(InferenceResult {
            output,
            request_id: response.request_id,
        })
    }
}

/// A caller-supplied function bound to the model whose results it consumes.
pub struct ModelHandle<F> {
    identity: ModelIdentity,
    func: F,
}

pub fn register_model<F>(identity: ModelIdentity, func: F) -> ModelHandle<F> {
    ModelHandle { identity, func }
}

impl<F> ModelHandle<F> {
    pub fn identity(&self) -> ModelIdentity {
        self.identity
    }

    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        (self.func)(args)
    }
}
