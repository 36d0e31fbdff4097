//! Model session construction, remote artifacts and inference modes.

mod common;

use common::{FixedLoader, FixedRuntime, PlatformBuilder, MODEL_BYTES};
use serde_json::json;
use std::path::PathBuf;
use verity_core::models::{InferenceRequest, ModelIdentity, Tensor, TensorMap};
use verity_core::session::{ModelSession, ModelSpec};
use verity_core::AgentError;

fn inputs() -> TensorMap {
    TensorMap::from([("x".to_string(), Tensor::vector(vec![0.1, 0.2, 0.3]))])
}

#[tokio::test]
async fn local_inference_returns_runtime_output_without_network() {
    let loader = FixedLoader::default();
    let session = ModelSession::open_with(&ModelSpec::local("model.onnx"), None, &loader)
        .await
        .unwrap();

    let output = session.run(InferenceRequest::Tensors(inputs())).unwrap();

    assert_eq!(output, FixedRuntime::output());
    assert_eq!(*loader.loaded.lock().unwrap(), vec![PathBuf::from("model.onnx")]);
    assert_eq!(*loader.runtime.seen.lock().unwrap(), vec![inputs()]);
    assert!(session.identity().is_none());
}

#[tokio::test]
async fn local_session_refuses_verifiable_inference() {
    let platform = PlatformBuilder::default().spawn().await;
    let session = ModelSession::open_with(
        &ModelSpec::local("model.onnx"),
        Some(common::registry(&platform)),
        &FixedLoader::default(),
    )
    .await
    .unwrap();

    let err = session
        .run_verifiable(InferenceRequest::Tensors(inputs()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Configuration(_)), "{err}");
    assert_eq!(common::Platform::hits(&platform.run_hits), 0);
}

#[tokio::test]
async fn inconsistent_specs_fail_before_loading() {
    let loader = FixedLoader::default();
    let both = ModelSpec {
        model_path: Some("model.onnx".into()),
        model_id: Some(1),
        version_id: Some(2),
        output_dir: None,
    };
    for spec in [ModelSpec::default(), both] {
        let err = ModelSession::open_with(&spec, None, &loader).await.err().unwrap();
        assert!(matches!(err, AgentError::Configuration(_)));
    }
    assert!(loader.loaded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn remote_model_needs_credentials() {
    let spec = ModelSpec::remote(ModelIdentity::new(1, 2), ".");
    let err = ModelSession::open_with(&spec, None, &FixedLoader::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AgentError::Configuration(_)));
}

#[tokio::test]
async fn unfinished_model_is_never_downloaded() {
    let platform = PlatformBuilder::default().status("PROCESSING").spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let loader = FixedLoader::default();

    let err = ModelSession::open_with(
        &ModelSpec::remote(ModelIdentity::new(1, 2), dir.path()),
        Some(common::registry(&platform)),
        &loader,
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, AgentError::Configuration(ref msg) if msg.contains("Processing")), "{err}");
    assert_eq!(common::Platform::hits(&platform.version_hits), 1);
    assert_eq!(common::Platform::hits(&platform.download_hits), 0);
    assert!(loader.loaded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn completed_model_is_downloaded_and_loaded() {
    let platform = PlatformBuilder::default().spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let loader = FixedLoader::default();

    let session = ModelSession::open_with(
        &ModelSpec::remote(ModelIdentity::new(1, 2), dir.path()),
        Some(common::registry(&platform)),
        &loader,
    )
    .await
    .unwrap();

    let expected = dir.path().join("mnist.onnx");
    assert_eq!(*loader.loaded.lock().unwrap(), vec![expected.clone()]);
    assert_eq!(std::fs::read(&expected).unwrap(), MODEL_BYTES);
    assert_eq!(common::Platform::hits(&platform.download_hits), 1);
    assert_eq!(session.identity(), Some(ModelIdentity::new(1, 2)));
}

#[tokio::test]
async fn verifiable_inference_posts_inputs_to_deployment() {
    let platform = PlatformBuilder::default().spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let session = ModelSession::open_with(
        &ModelSpec::remote(ModelIdentity::new(1, 2), dir.path()),
        Some(common::registry(&platform)),
        &FixedLoader::default(),
    )
    .await
    .unwrap();

    let result = session
        .run_verifiable(InferenceRequest::Tensors(inputs()))
        .await
        .unwrap();

    assert_eq!(result.request_id, "r1");
    assert_eq!(result.output.shape, vec![1, 3]);
    assert_eq!(result.output.argmax(), Some(1));
    let args = platform.last_run_args.lock().unwrap().clone().unwrap();
    assert_eq!(args, json!({ "args": { "x": [0.10000000149011612, 0.20000000298023224, 0.30000001192092896] } }));
}

#[tokio::test]
async fn verifiable_inference_without_deployment_is_rejected() {
    let platform = PlatformBuilder::default().deployments(vec![]).spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let session = ModelSession::open_with(
        &ModelSpec::remote(ModelIdentity::new(1, 2), dir.path()),
        Some(common::registry(&platform)),
        &FixedLoader::default(),
    )
    .await
    .unwrap();

    let err = session
        .run_verifiable(InferenceRequest::Tensors(inputs()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Configuration(ref msg) if msg.contains("no active deployment")));
    assert_eq!(common::Platform::hits(&platform.run_hits), 0);
}

#[tokio::test]
async fn mismatched_input_tensor_fails_before_deployment_call() {
    let platform = PlatformBuilder::default().spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let session = ModelSession::open_with(
        &ModelSpec::remote(ModelIdentity::new(1, 2), dir.path()),
        Some(common::registry(&platform)),
        &FixedLoader::default(),
    )
    .await
    .unwrap();
    let broken = TensorMap::from([(
        "x".to_string(),
        Tensor {
            shape: vec![2, 2],
            data: vec![1.0],
        },
    )]);

    let err = session
        .run_verifiable(InferenceRequest::Tensors(broken.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Inference(_)), "{err}");
    assert_eq!(common::Platform::hits(&platform.run_hits), 0);

    let err = session.run(InferenceRequest::Tensors(broken)).unwrap_err();
    assert!(matches!(err, AgentError::Inference(_)));
}
