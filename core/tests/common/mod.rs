//! In-process fakes: a platform API served by axum, an inference runtime,
//! a verification backend and a chain.

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use verity_core::error::Result;
use verity_core::models::{ModelIdentity, ProofMetadata, Tensor, TensorMap, TransactionReceipt};
use verity_core::services::api::ApiClient;
use verity_core::services::chain::ChainClient;
use verity_core::services::registry::RegistryClient;
use verity_core::services::verifier::VerificationBackend;
use verity_core::session::{InferenceRuntime, RuntimeLoader};
use verity_core::ApiConfig;

pub const MODEL_BYTES: &[u8] = b"onnx-model-bytes";

/// Knobs and counters for the fake platform.
pub struct Platform {
    pub base: String,
    pub status: String,
    pub deployments: Vec<String>,
    pub proof_status: StatusCode,
    pub proof_body: Option<String>,
    pub version_hits: AtomicUsize,
    pub download_hits: AtomicUsize,
    pub proof_hits: AtomicUsize,
    pub run_hits: AtomicUsize,
    pub last_proof_path: Mutex<Option<(u64, u64, String, String)>>,
    pub last_run_args: Mutex<Option<Value>>,
}

impl Platform {
    pub fn hits(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct PlatformBuilder {
    status: String,
    deployments: Option<Vec<String>>,
    proof_status: StatusCode,
    proof_body: Option<String>,
}

impl Default for PlatformBuilder {
    fn default() -> Self {
        Self {
            status: "COMPLETED".into(),
            deployments: None,
            proof_status: StatusCode::OK,
            proof_body: None,
        }
    }
}

impl PlatformBuilder {
    pub fn status(mut self, status: &str) -> Self {
        self.status = status.into();
        self
    }

    pub fn deployments(mut self, uris: Vec<String>) -> Self {
        self.deployments = Some(uris);
        self
    }

    pub fn proof_status(mut self, status: StatusCode) -> Self {
        self.proof_status = status;
        self
    }

    /// Raw body served with a 200 in place of the proof document.
    pub fn proof_body(mut self, body: &str) -> Self {
        self.proof_body = Some(body.into());
        self
    }

    /// Binds an ephemeral port and serves the fake API on it. Unless set,
    /// the single deployment points back at this server's `/deploy`.
    pub async fn spawn(self) -> Arc<Platform> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let platform = Arc::new(Platform {
            deployments: self
                .deployments
                .unwrap_or_else(|| vec![format!("{}/deploy", base)]),
            base,
            status: self.status,
            proof_status: self.proof_status,
            proof_body: self.proof_body,
            version_hits: AtomicUsize::new(0),
            download_hits: AtomicUsize::new(0),
            proof_hits: AtomicUsize::new(0),
            run_hits: AtomicUsize::new(0),
            last_proof_path: Mutex::new(None),
            last_run_args: Mutex::new(None),
        });

        let app = Router::new()
            .route("/api/v1/models/:model/versions/:version", get(version))
            .route("/api/v1/models/:model/versions/:version/deployments", get(deployments))
            .route(
                "/api/v1/models/:model/versions/:version/deployments/:uri/proofs/:request",
                get(proof),
            )
            .route("/api/v1/workspaces", get(workspace))
            .route("/files/model.onnx", get(artifact))
            .route("/deploy/cairo_run", post(cairo_run))
            .with_state(platform.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        platform
    }
}

async fn version(State(p): State<Arc<Platform>>, Path((_model, version)): Path<(u64, String)>) -> Response {
    if let Some(version) = version.strip_suffix(":download_original") {
        assert_eq!(p.status, "COMPLETED", "download requested for a version that is not ready");
        assert_eq!(version, "2");
        return Json(json!({ "download_url": format!("{}/files/model.onnx", p.base) })).into_response();
    }
    p.version_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "version": version.parse::<u64>().unwrap(),
        "status": p.status,
        "original_model_path": "gs://bucket/models/mnist.onnx",
    }))
    .into_response()
}

async fn artifact(State(p): State<Arc<Platform>>) -> Vec<u8> {
    p.download_hits.fetch_add(1, Ordering::SeqCst);
    MODEL_BYTES.to_vec()
}

async fn deployments(State(p): State<Arc<Platform>>) -> Json<Value> {
    let list: Vec<Value> = p
        .deployments
        .iter()
        .enumerate()
        .map(|(i, uri)| json!({ "id": i + 1, "uri": uri, "is_active": true }))
        .collect();
    Json(Value::Array(list))
}

async fn proof(
    State(p): State<Arc<Platform>>,
    Path((model, version, uri, request)): Path<(u64, u64, String, String)>,
) -> Response {
    p.proof_hits.fetch_add(1, Ordering::SeqCst);
    *p.last_proof_path.lock().unwrap() = Some((model, version, uri, request.clone()));
    if p.proof_status != StatusCode::OK {
        return (p.proof_status, "proof not found").into_response();
    }
    if let Some(body) = &p.proof_body {
        return (StatusCode::OK, body.clone()).into_response();
    }
    Json(json!({
        "id": 77,
        "job_id": 12,
        "request_id": request,
        "proof": "0x0badc0de",
    }))
    .into_response()
}

async fn workspace() -> Json<Value> {
    Json(json!({ "status": "COMPLETED", "url": "https://workspace.example" }))
}

async fn cairo_run(State(p): State<Arc<Platform>>, Json(body): Json<Value>) -> Json<Value> {
    p.run_hits.fetch_add(1, Ordering::SeqCst);
    *p.last_run_args.lock().unwrap() = Some(body);
    Json(json!({ "result": [[0.1, 0.7, 0.2]], "request_id": "r1" }))
}

pub fn registry(platform: &Platform) -> RegistryClient {
    let config = ApiConfig::new(platform.base.clone()).with_credentials(Some("token".into()), None);
    RegistryClient::new(ApiClient::new(config))
}

/// Address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Runtime that echoes a fixed output and records its inputs.
#[derive(Clone, Default)]
pub struct FixedRuntime {
    pub seen: Arc<Mutex<Vec<TensorMap>>>,
}

impl FixedRuntime {
    pub fn output() -> Tensor {
        Tensor::new(vec![1, 3], vec![0.2, 0.5, 0.3]).unwrap()
    }
}

impl InferenceRuntime for FixedRuntime {
    fn run(&self, inputs: &TensorMap) -> Result<Vec<Tensor>> {
        self.seen.lock().unwrap().push(inputs.clone());
        Ok(vec![Self::output(), Tensor::vector(vec![9.0])])
    }
}

#[derive(Clone, Default)]
pub struct FixedLoader {
    pub runtime: FixedRuntime,
    pub loaded: Arc<Mutex<Vec<PathBuf>>>,
}

impl RuntimeLoader for FixedLoader {
    fn load(&self, path: &FsPath) -> Result<Box<dyn InferenceRuntime>> {
        self.loaded.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(self.runtime.clone()))
    }
}

pub enum Verdict {
    Valid,
    Invalid,
    Error,
}

pub struct FakeVerifier {
    pub verdict: Verdict,
    pub calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VerificationBackend for FakeVerifier {
    async fn verify(&self, _proof: &ProofMetadata, identity: ModelIdentity) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(identity, ModelIdentity::new(1, 2));
        match self.verdict {
            Verdict::Valid => Ok(true),
            Verdict::Invalid => Ok(false),
            Verdict::Error => anyhow::bail!("proof is malformed"),
        }
    }
}

pub struct FakeChain {
    pub account: Address,
    pub fail_receipt: bool,
    pub submitted: Mutex<Vec<(Address, Bytes)>>,
}

impl FakeChain {
    pub fn new(account: Address) -> Arc<Self> {
        Arc::new(Self {
            account,
            fail_receipt: false,
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn reverting(account: Address) -> Arc<Self> {
        Arc::new(Self {
            account,
            fail_receipt: true,
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit(&self, contract: Address, calldata: Bytes) -> Result<TransactionReceipt> {
        self.submitted.lock().unwrap().push((contract, calldata));
        Ok(TransactionReceipt {
            tx_hash: B256::repeat_byte(0xab),
            block_number: Some(42),
            gas_used: 21_000,
            failed: self.fail_receipt,
        })
    }
}
