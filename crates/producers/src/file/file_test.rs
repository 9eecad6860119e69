//! File producer tests: batching to disk, rotation, compression,
//! graceful shutdown

use std::fs;
use std::path::Path;
use std::time::Duration;

use gollum_config::{FileProducerConfig, GlobalConfig};
use gollum_core::{Message, PluginControl, PluginState, StreamId, StreamRegistry};

use super::*;

fn file_config(path: &Path) -> FileProducerConfig {
    FileProducerConfig {
        file: path.to_string_lossy().into_owned(),
        stream: vec!["files".into()],
        ..FileProducerConfig::default()
    }
}

fn msg(payload: Vec<u8>) -> Message {
    Message::new(payload, StreamId::from_name("files"))
}

fn setup(
    config: &FileProducerConfig,
) -> (
    FileProducer,
    tokio::sync::mpsc::Sender<PluginControl>,
    Arc<StateCell>,
) {
    let registry = Arc::new(StreamRegistry::new());
    FileProducer::configure("logfile", config, &GlobalConfig::default(), &registry).unwrap()
}

#[tokio::test]
async fn test_configure_requires_file() {
    let registry = Arc::new(StreamRegistry::new());
    let config = FileProducerConfig::default();
    let err = FileProducer::configure("logfile", &config, &GlobalConfig::default(), &registry)
        .unwrap_err();
    assert!(err.to_string().contains("file"));
}

#[tokio::test]
async fn test_writes_to_plain_file_without_rotation() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("app.log");
    let (mut producer, _control, _state) = setup(&file_config(&target));

    producer.write_message(msg(b"hello\n".to_vec())).await;
    producer.write_message(msg(b"world\n".to_vec())).await;
    producer.write_batch().await;
    assert!(producer.batch.wait_for_flush(Duration::from_secs(1)).await);

    assert_eq!(fs::read(&target).unwrap(), b"hello\nworld\n");
    // No rotation artifacts without rotate = true.
    assert!(!tmp.path().join("app_current").exists());
}

#[tokio::test]
async fn test_rotation_by_size_with_compression() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("app.log");
    let mut config = file_config(&target);
    config.rotate = true;
    config.rotate_size_mb = 1;
    config.compress = true;

    let (mut producer, _control, _state) = setup(&config);

    // 1.5 MiB in 256 KiB messages, flushed to the first file.
    for _ in 0..6 {
        producer.write_message(msg(vec![b'a'; 256 << 10])).await;
    }
    producer.write_batch().await;
    assert!(producer.batch.wait_for_flush(Duration::from_secs(5)).await);

    // The next batch crosses the size trigger: exactly one rotation.
    producer.write_message(msg(vec![b'b'; 1024])).await;
    producer.write_batch().await;
    assert!(producer.batch.wait_for_flush(Duration::from_secs(5)).await);

    for handle in producer.compressors.drain(..) {
        handle.await.unwrap();
    }

    let mut gz = Vec::new();
    let mut logs = Vec::new();
    for entry in fs::read_dir(tmp.path()).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        if name.ends_with(".gz") {
            gz.push(name);
        } else if name.ends_with(".log") {
            logs.push(name);
        }
    }
    assert_eq!(gz.len(), 1, "expected one compressed file, got {gz:?}");
    assert_eq!(logs.len(), 1, "expected one active file, got {logs:?}");

    // The current symlink resolves to the active (newest) file.
    let link = tmp.path().join("app_current");
    let current = fs::read_link(&link).unwrap();
    assert_eq!(current.to_string_lossy(), logs[0]);

    let active = fs::read(tmp.path().join(&logs[0])).unwrap();
    assert_eq!(active.len(), 1024);
}

#[tokio::test]
async fn test_forced_roll_rotates_once() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("app.log");
    let mut config = file_config(&target);
    config.rotate = true;

    let (mut producer, _control, _state) = setup(&config);

    producer.write_message(msg(b"before\n".to_vec())).await;
    producer.write_batch().await;
    assert!(producer.batch.wait_for_flush(Duration::from_secs(1)).await);

    producer.rotate().await;
    producer.write_message(msg(b"after\n".to_vec())).await;
    producer.write_batch().await;
    assert!(producer.batch.wait_for_flush(Duration::from_secs(1)).await);

    let logs: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".log"))
        .collect();
    assert_eq!(logs.len(), 2, "roll must open a second file: {logs:?}");
}

#[tokio::test]
async fn test_oversized_message_counted() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("app.log");
    let mut config = file_config(&target);
    config.batch_size_max_kb = 1; // 1 KB capacity

    let (mut producer, _control, _state) = setup(&config);
    producer.write_message(msg(vec![b'x'; 4096])).await;

    assert_eq!(producer.base.metrics().snapshot().oversized, 1);
    assert_eq!(producer.batch.message_count(), 0);
}

#[tokio::test]
async fn test_graceful_shutdown_flushes_queue() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("app.log");
    let (producer, control, state) = setup(&file_config(&target));
    let queue = producer.base.queue();

    let runner = tokio::spawn(producer.run());
    control.send(PluginControl::StartProducer).await.unwrap();

    for i in 0..100 {
        queue
            .try_push(msg(format!("line {i}\n").into_bytes()))
            .unwrap();
    }
    control.send(PluginControl::StopProducer).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("producer stopped in time")
        .unwrap();

    assert_eq!(state.get(), PluginState::Dead);
    let written = fs::read_to_string(&target).unwrap();
    assert_eq!(written.lines().count(), 100);
    assert!(written.contains("line 0\n"));
    assert!(written.contains("line 99\n"));
}

#[tokio::test]
async fn test_stop_before_start_exits_clean() {
    let tmp = tempfile::tempdir().unwrap();
    let (producer, control, state) = setup(&file_config(&tmp.path().join("app.log")));

    let runner = tokio::spawn(producer.run());
    control.send(PluginControl::StopProducer).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.get(), PluginState::Dead);
}
