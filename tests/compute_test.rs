mod common;

use common::{MockEngine, metadata};
use spawntable::compute::subprocess::SubprocessEngine;
use spawntable::compute::{ComputeAdapter, SpawnEngine, VolumeDescriptor};
use spawntable::error::ComputeError;
use spawntable::storage::fetcher::VolumeArtifacts;
use std::sync::Arc;

fn artifacts(segmentation: &[u8]) -> VolumeArtifacts {
    VolumeArtifacts {
        metadata: metadata(),
        segmentation: segmentation.to_vec(),
        sizes: vec![1, 0, 0, 0],
        bboxes: vec![0; 12],
    }
}

#[tokio::test]
async fn test_handle_is_released_once_after_success() {
    let engine = Arc::new(MockEngine::new(b"table".to_vec()));
    let adapter = ComputeAdapter::new(engine.clone());

    let table = adapter.compute(artifacts(b"a"), artifacts(b"b")).await.unwrap();

    assert_eq!(table, b"table");
    assert_eq!(engine.generated(), 1);
    assert_eq!(engine.released(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn test_handle_is_released_once_when_reading_fails() {
    let engine = Arc::new(MockEngine::new(b"table".to_vec()).failing_reads());
    let adapter = ComputeAdapter::new(engine.clone());

    let err = adapter.compute(artifacts(b"a"), artifacts(b"b")).await.unwrap_err();

    assert!(matches!(err, ComputeError::InvalidOutput(_)));
    assert_eq!(engine.released(), 1);
}

#[tokio::test]
async fn test_nothing_to_release_when_generate_fails() {
    let engine = Arc::new(MockEngine::new(b"table".to_vec()).poisoned_by(b"a".to_vec()));
    let adapter = ComputeAdapter::new(engine.clone());

    let err = adapter.compute(artifacts(b"a"), artifacts(b"b")).await.unwrap_err();

    assert!(matches!(err, ComputeError::Engine(_)));
    assert_eq!(engine.generated(), 1);
    assert_eq!(engine.released(), 0);
}

#[tokio::test]
async fn test_non_utf8_metadata_is_rejected() {
    let engine = Arc::new(MockEngine::new(b"table".to_vec()));
    let adapter = ComputeAdapter::new(engine.clone());
    let mut pre = artifacts(b"a");
    pre.metadata = vec![0xff, 0xfe];

    let err = adapter.compute(pre, artifacts(b"b")).await.unwrap_err();

    assert!(matches!(err, ComputeError::InvalidMetadata(_)));
    assert_eq!(engine.generated(), 0);
}

#[tokio::test]
async fn test_concurrent_computations_each_get_their_own_handle() {
    let engine = Arc::new(MockEngine::new(b"table".to_vec()));
    let adapter = ComputeAdapter::new(engine.clone());

    let mut handles = Vec::new();
    for i in 0..16u8 {
        let adapter = adapter.clone();
        handles.push(tokio::spawn(async move { adapter.compute(artifacts(&[i]), artifacts(&[i, i])).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), b"table");
    }

    assert_eq!(engine.generated(), 16);
    assert_eq!(engine.released(), 16);
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_descriptors_carry_artifacts_unchanged() {
    let descriptor = VolumeDescriptor::from_artifacts(artifacts(b"labels")).unwrap();
    assert_eq!(descriptor.segmentation, b"labels");
    assert_eq!(descriptor.sizes, vec![1, 0, 0, 0]);

    let encoded = descriptor.encode().unwrap();
    let (decoded, used) = VolumeDescriptor::decode(&encoded).unwrap();
    assert_eq!(used, encoded.len());
    assert_eq!(decoded, descriptor);
}

#[cfg(unix)]
fn shell_engine(script: &str) -> SubprocessEngine {
    SubprocessEngine::new("sh").with_args(["-c", script])
}

#[cfg(unix)]
fn descriptor() -> VolumeDescriptor {
    VolumeDescriptor::from_artifacts(artifacts(b"labels")).unwrap()
}

#[cfg(unix)]
#[test]
fn test_subprocess_result_is_read_and_released() {
    let engine = shell_engine(r"cat > /dev/null; printf '\003\000\000\000abc'");

    let handle = engine.generate(&descriptor(), &descriptor()).unwrap();
    assert_eq!(engine.outstanding(), 1);
    assert_eq!(engine.read_result(&handle).unwrap(), b"abc");

    let id = handle.id();
    engine.release(handle);
    assert_eq!(engine.outstanding(), 0);
    assert!(matches!(
        engine.read_result(&spawntable::compute::EngineHandle::new(id)),
        Err(ComputeError::UnknownHandle(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_subprocess_engine_behind_the_adapter() {
    let engine = Arc::new(shell_engine(r"cat > /dev/null; printf '\002\000\000\000ok'"));
    let adapter = ComputeAdapter::new(engine.clone());

    let table = adapter.compute(artifacts(b"a"), artifacts(b"b")).await.unwrap();

    assert_eq!(table, b"ok");
    assert_eq!(engine.outstanding(), 0);
}

#[cfg(unix)]
#[test]
fn test_subprocess_failure_reports_stderr() {
    let engine = shell_engine("cat > /dev/null; echo boom >&2; exit 3");

    match engine.generate(&descriptor(), &descriptor()) {
        Err(ComputeError::Engine(message)) => assert!(message.contains("boom")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(engine.outstanding(), 0);
}

#[cfg(unix)]
#[test]
fn test_subprocess_trailing_output_is_rejected() {
    let engine = shell_engine(r"cat > /dev/null; printf '\001\000\000\000ab'");

    assert!(matches!(
        engine.generate(&descriptor(), &descriptor()),
        Err(ComputeError::InvalidOutput(_))
    ));
}

#[test]
fn test_missing_engine_binary_is_an_io_error() {
    let engine = SubprocessEngine::new("/nonexistent/spawn-engine");
    let d = VolumeDescriptor::from_artifacts(artifacts(b"x")).unwrap();
    assert!(matches!(engine.generate(&d, &d), Err(ComputeError::Io(_))));
}
