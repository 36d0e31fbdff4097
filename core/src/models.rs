//! Data models shared by the pipeline and the remote API clients

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{AgentError, Result};

/// Remote model/version pair a proof must correspond to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub model_id: u64,
    pub version_id: u64,
}

impl ModelIdentity {
    pub fn new(model_id: u64, version_id: u64) -> Self {
        Self { model_id, version_id }
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model {} version {}", self.model_id, self.version_id)
    }
}

/// Dense f32 tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let tensor = Self { shape, data };
        tensor.validate()?;
        Ok(tensor)
    }

    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Builds a tensor from a (possibly nested) JSON number array.
    pub fn from_json(value: &Value) -> Result<Self> {
        struct Walk {
            shape: Vec<usize>,
            data: Vec<f32>,
            /// Depth of the first number seen; every number must sit there.
            leaf: Option<usize>,
        }

        fn walk(value: &Value, depth: usize, acc: &mut Walk) -> Result<()> {
            let ragged = || AgentError::Inference("ragged tensor".into());
            match value {
                Value::Number(n) => {
                    if depth != acc.shape.len() || acc.leaf.is_some_and(|leaf| leaf != depth) {
                        return Err(ragged());
                    }
                    acc.leaf = Some(depth);
                    acc.data.push(n.as_f64().unwrap_or_default() as f32);
                    Ok(())
                }
                Value::Array(items) => {
                    if acc.leaf.is_some_and(|leaf| depth >= leaf) {
                        return Err(ragged());
                    }
                    if depth == acc.shape.len() {
                        acc.shape.push(items.len());
                    } else if acc.shape[depth] != items.len() {
                        return Err(ragged());
                    }
                    items.iter().try_for_each(|item| walk(item, depth + 1, acc))
                }
                other => Err(AgentError::Inference(format!("expected number, got {other}"))),
            }
        }

        let mut acc = Walk {
            shape: Vec::new(),
            data: Vec::new(),
            leaf: None,
        };
        walk(value, 0, &mut acc)?;
        Self::new(acc.shape, acc.data)
    }

    /// Checks that `data` holds exactly as many values as `shape` describes.
    pub fn validate(&self) -> Result<()> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(AgentError::Inference(format!(
                "shape {:?} needs {} values, got {}",
                self.shape,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Nested JSON array with the tensor's shape. Missing values render as
    /// `null`; call [`validate`](Tensor::validate) first to rule that out.
    pub fn to_json(&self) -> Value {
        fn build(shape: &[usize], data: &[f32]) -> Value {
            match shape.split_first() {
                None => data.first().map(|v| Value::from(*v as f64)).unwrap_or(Value::Null),
                Some((&n, rest)) => {
                    let stride: usize = rest.iter().product();
                    Value::Array(
                        (0..n)
                            .map(|i| build(rest, data.get(i * stride..(i + 1) * stride).unwrap_or(&[])))
                            .collect(),
                    )
                }
            }
        }
        build(&self.shape, &self.data)
    }

    /// Index of the largest value, ignoring shape.
    pub fn argmax(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

pub type TensorMap = BTreeMap<String, Tensor>;

/// Input to a model run: named tensors, or a JSON file holding them.
#[derive(Debug, Clone)]
pub enum InferenceRequest {
    Tensors(TensorMap),
    File(PathBuf),
}

impl InferenceRequest {
    /// Exactly one of `tensors` and `file` must be given.
    pub fn from_parts(tensors: Option<TensorMap>, file: Option<PathBuf>) -> Result<Self> {
        match (tensors, file) {
            (Some(tensors), None) => Ok(InferenceRequest::Tensors(tensors)),
            (None, Some(file)) => Ok(InferenceRequest::File(file)),
            (Some(_), Some(_)) => Err(AgentError::config(
                "provide either input tensors or an input file, not both",
            )),
            (None, None) => Err(AgentError::config("either input tensors or an input file is required")),
        }
    }

    /// Resolves the request into named tensors. Input files are JSON objects
    /// mapping each input name to `{"shape": [...], "data": [...]}`.
    pub fn into_tensors(self) -> Result<TensorMap> {
        let tensors = match self {
            InferenceRequest::Tensors(tensors) => tensors,
            InferenceRequest::File(path) => {
                let raw = std::fs::read(&path)?;
                serde_json::from_slice(&raw).map_err(|e| {
                    AgentError::Inference(format!("invalid input file {}: {}", path.display(), e))
                })?
            }
        };
        for (name, tensor) in &tensors {
            tensor
                .validate()
                .map_err(|e| AgentError::Inference(format!("input {name}: {e}")))?;
        }
        Ok(tensors)
    }
}

/// Output of a verifiable run, correlated to its proof by `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub output: Tensor,
    pub request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Uploading,
    Uploaded,
    Queued,
    Starting,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: u64,
    pub status: VersionStatus,
    #[serde(default)]
    pub original_model_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadLink {
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: u64,
    pub uri: String,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub status: String,
    pub url: String,
}

/// Request body for a verifiable run on a deployment.
#[derive(Debug, Clone, Serialize)]
pub struct CairoRunRequest {
    pub args: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CairoRunResponse {
    pub result: Value,
    pub request_id: String,
}

/// Proof document as served by the proof API. Opaque to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofMetadata(pub Value);

impl ProofMetadata {
    /// Canonical bytes used for signing and signer recovery: compact JSON
    /// with object keys in sorted order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        fn sorted(value: &Value) -> Value {
            match value {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    Value::Object(keys.into_iter().map(|k| (k.clone(), sorted(&map[k]))).collect())
                }
                Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
                other => other.clone(),
            }
        }
        serde_json::to_vec(&sorted(&self.0)).unwrap_or_default()
    }
}

/// Outcome of a contract call as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u128,
    pub failed: bool,
}
