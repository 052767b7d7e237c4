//! End-to-end tests driving each processor variant through its public API
//! only (`build_processor` and the `OperationProcessor` trait), the way an
//! embedding SDK would.

use std::sync::Arc;
use std::time::Duration;

use neptune_op_pipeline::test_double::RecordingBackend;
use neptune_op_pipeline::{
    build_processor, Backend, ConfigError, ContainerType, Operation, ProcessorConfig,
    ProcessorError, UniqueId,
};

/// Installs a `tracing` subscriber once so the crate's structured log events
/// are visible with `--nocapture`; harmless (and a no-op) if a subscriber is
/// already installed, since tests in this file run concurrently.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn short_config() -> ProcessorConfig {
    let mut config = ProcessorConfig::default();
    config.flush_period = Duration::from_millis(20);
    config.max_backoff = Duration::from_millis(100);
    config
}

#[test]
fn sync_processor_submits_immediately() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let backend: Arc<dyn Backend> = Arc::new(RecordingBackend::new());

    let processor = build_processor(
        "sync",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend,
        ProcessorConfig::default(),
        None,
    )
    .unwrap();

    processor
        .process(Operation::AssignFloat {
            path: vec!["acc".into()],
            value: 0.99,
        })
        .unwrap();

    let data_path = processor.data_path().to_path_buf();
    processor.stop(Duration::from_secs(1)).unwrap();
    assert!(!data_path.exists());
}

#[test]
fn offline_processor_never_touches_the_backend() {
    let root = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new());

    let processor = build_processor(
        "offline",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend.clone(),
        ProcessorConfig::default(),
        None,
    )
    .unwrap();

    for i in 0..3 {
        processor
            .process(Operation::LogFloatSeries {
                path: vec!["loss".into()],
                value: i as f64,
                step: Some(i as f64),
                timestamp: None,
            })
            .unwrap();
    }
    processor.flush().unwrap();

    let data_path = processor.data_path().to_path_buf();
    processor.stop(Duration::from_secs(1)).unwrap();

    assert!(data_path.exists(), "offline stop preserves the data path");
    assert!(backend.received().is_empty(), "offline must never call the backend");
}

#[test]
fn async_processor_drains_everything_before_stop_returns() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new());

    let processor = build_processor(
        "async",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend.clone(),
        short_config(),
        None,
    )
    .unwrap();

    for i in 0..25 {
        processor
            .process(Operation::AssignString {
                path: vec![format!("tag{i}")],
                value: "v".into(),
            })
            .unwrap();
    }

    processor.stop(Duration::from_secs(5)).unwrap();
    assert_eq!(backend.received().len(), 25);
}

#[test]
fn async_processor_survives_transient_backend_failures() {
    let root = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new());
    backend.fail_next(2);

    let processor = build_processor(
        "async",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend.clone(),
        short_config(),
        None,
    )
    .unwrap();

    processor
        .process(Operation::DeleteAttribute {
            path: vec!["stale".into()],
        })
        .unwrap();

    processor.stop(Duration::from_secs(5)).unwrap();
    assert_eq!(backend.received().len(), 1);
}

#[test]
fn async_processor_acks_around_a_permanent_rejection() {
    let root = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new());
    backend.reject_version(2);

    let processor = build_processor(
        "async",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend.clone(),
        short_config(),
        None,
    )
    .unwrap();

    for i in 0..3 {
        processor
            .process(Operation::AssignBool {
                path: vec![format!("flag{i}")],
                value: i % 2 == 0,
            })
            .unwrap();
    }

    processor.stop(Duration::from_secs(5)).unwrap();
    // Version 2 was rejected; the other two were accepted.
    assert_eq!(backend.received().len(), 2);
}

#[test]
fn async_processor_flush_blocks_until_everything_queued_is_acked() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new());

    let processor = build_processor(
        "async",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend.clone(),
        short_config(),
        None,
    )
    .unwrap();

    for i in 0..7 {
        processor
            .process(Operation::AssignFloat {
                path: vec![format!("metric{i}")],
                value: i as f64,
            })
            .unwrap();
    }

    // flush() must not return until the consumer has acked everything that
    // was put before this call, not merely fsync'd it.
    processor.flush().unwrap();
    assert_eq!(backend.received().len(), 7);

    processor.stop(Duration::from_secs(2)).unwrap();
}

#[test]
fn unknown_connection_mode_is_a_config_error() {
    let root = tempfile::tempdir().unwrap();
    let backend: Arc<dyn Backend> = Arc::new(RecordingBackend::new());

    let err = build_processor(
        "carrier-pigeon",
        root.path(),
        ContainerType::Run,
        UniqueId::new("run-1"),
        backend,
        ProcessorConfig::default(),
        None,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ProcessorError::Config(ConfigError::UnknownConnectionMode(_))
    ));
}

#[test]
fn two_processors_for_the_same_container_get_distinct_data_paths() {
    let root = tempfile::tempdir().unwrap();
    let backend: Arc<dyn Backend> = Arc::new(RecordingBackend::new());

    let a = build_processor(
        "offline",
        root.path(),
        ContainerType::Model,
        UniqueId::new("same-id"),
        backend.clone(),
        ProcessorConfig::default(),
        None,
    )
    .unwrap();
    let b = build_processor(
        "offline",
        root.path(),
        ContainerType::Model,
        UniqueId::new("same-id"),
        backend,
        ProcessorConfig::default(),
        None,
    )
    .unwrap();

    assert_ne!(a.data_path(), b.data_path());
    assert!(a.data_path().starts_with(root.path().join("offline")));
}

#[test]
fn build_processor_threads_the_lock_through_to_offline_construction() {
    let root = tempfile::tempdir().unwrap();
    let backend: Arc<dyn Backend> = Arc::new(RecordingBackend::new());
    let lock = Arc::new(std::sync::Mutex::new(()));

    let guard = lock.lock().unwrap();
    let lock_for_thread = lock.clone();
    let root_path = root.path().to_path_buf();
    let handle = std::thread::spawn(move || {
        build_processor(
            "offline",
            &root_path,
            ContainerType::Run,
            UniqueId::new("run-1"),
            backend,
            ProcessorConfig::default(),
            Some(lock_for_thread),
        )
        .unwrap()
    });

    std::thread::sleep(Duration::from_millis(50));
    assert!(
        !handle.is_finished(),
        "build_processor must block on the caller-supplied lock, not ignore it"
    );
    drop(guard);
    let processor = handle.join().unwrap();
    assert!(processor.data_path().exists());
}
