//! Verity core
//!
//! Runs a model, fetches the proof of that inference from the proving
//! service, verifies it, and carries the prediction into a contract call.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod session;

pub use config::{AgentConfig, ApiConfig, ChainConfig};
pub use error::{AgentError, PipelineError, Stage};
pub use models::{InferenceRequest, InferenceResult, ModelIdentity, ProofMetadata, Tensor, TensorMap, TransactionReceipt};
pub use pipeline::{InferenceAgent, PipelineRun};
pub use session::{register_model, ModelHandle, ModelSession, ModelSpec};
