//! Error types for the verifiable-inference pipeline

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Inconsistent or incomplete construction parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure reaching a remote API.
    #[error("{service} unavailable: {source}")]
    RemoteUnavailable {
        service: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A remote API answered with a non-success status.
    #[error("{service} rejected the request ({status}): {body}")]
    RemoteRejected {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Chain RPC failure outside of a transaction submission.
    #[error("Chain RPC error: {0}")]
    Rpc(String),

    #[error("Transaction to {contract} failed: {reason}")]
    SubmissionFailed { contract: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Configuration(msg.into())
    }

    pub fn unavailable<E>(service: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |source| AgentError::RemoteUnavailable {
            service,
            source: Box::new(source),
        }
    }

    /// HTTP status carried by a rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AgentError::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Inference,
    ProofFetch,
    Verification,
    Transmission,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Inference => "inference",
            Stage::ProofFetch => "proof fetch",
            Stage::Verification => "verification",
            Stage::Transmission => "transmission",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: AgentError,
}

impl PipelineError {
    pub fn at(stage: Stage) -> impl FnOnce(AgentError) -> Self {
        move |source| PipelineError { stage, source }
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
