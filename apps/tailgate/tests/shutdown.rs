#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tail_transport::memory::MemoryListener;
use tail_transport::{Frame, MemoryTransport};
use tailgate_core::{ClientConfig, ClientContext, ShutdownCoordinator};
use tokio::task::JoinHandle;

fn shell(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn context(logfile: &Path, command: Vec<String>, remove_logfile: bool) -> ClientContext {
    let config = ClientConfig::new(logfile, "memory://collector", command)
        .with_timeout(Duration::from_millis(2000))
        .with_poll_interval(Duration::from_millis(20))
        .with_remove_logfile(remove_logfile);
    ClientContext::new(config)
}

/// Plays a collector that holds nothing yet and keeps every byte it is sent,
/// across as many connections as the client makes.
fn collect(mut listener: MemoryListener) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut received = Vec::new();
        while let Some(mut peer) = listener.accept().await {
            if peer.recv_session_id().await.is_none() {
                continue;
            }
            peer.send_offset(received.len() as u64);
            while let Some(frame) = peer.recv().await {
                if let Frame::Binary(bytes) = frame {
                    received.extend_from_slice(&bytes);
                }
            }
        }
        received
    })
}

fn quoted(path: &Path) -> String {
    format!("'{}'", path.display())
}

fn log_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("job.log")
}

#[test_timeout::tokio_timeout_test(30)]
async fn ships_everything_the_command_wrote() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = log_path(&dir);
    let script = format!(
        "printf A >> {log}; sleep 0.3; printf B >> {log}",
        log = quoted(&path)
    );
    let (transport, listener) = MemoryTransport::new();
    let collector = collect(listener);

    let report = ShutdownCoordinator::new(context(&path, shell(&script), false))
        .run(transport)
        .await;

    assert!(report.child.success());
    assert!(report.stopped_gracefully());
    let summary = report.loop_summary.expect("summary");
    assert_eq!(summary.bytes_sent, 2);
    assert_eq!(collector.await.expect("collector"), b"AB");
}

#[test_timeout::tokio_timeout_test(30)]
async fn failing_command_still_shuts_down_gracefully() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = log_path(&dir);
    let (transport, listener) = MemoryTransport::new();
    let collector = collect(listener);

    let report = ShutdownCoordinator::new(context(
        &path,
        vec!["tailgate-no-such-program-7f3a".into()],
        false,
    ))
    .run(transport)
    .await;

    assert!(!report.child.success());
    assert!(report.stopped_gracefully());
    assert!(collector.await.expect("collector").is_empty());
}

#[test_timeout::tokio_timeout_test(30)]
async fn removing_the_log_skips_stale_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = log_path(&dir);
    std::fs::write(&path, b"stale run\n").expect("seed stale log");
    let script = format!("sleep 0.2; printf fresh >> {}", quoted(&path));
    let (transport, listener) = MemoryTransport::new();
    let collector = collect(listener);

    let report = ShutdownCoordinator::new(context(&path, shell(&script), true))
        .run(transport)
        .await;

    assert!(report.stopped_gracefully());
    assert_eq!(collector.await.expect("collector"), b"fresh");
}

#[test_timeout::tokio_timeout_test(30)]
async fn unreachable_collector_does_not_block_exit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = log_path(&dir);
    let (transport, _listener) = MemoryTransport::new();
    transport.set_refuse_all(true);

    let report = ShutdownCoordinator::new(context(&path, shell("true"), false))
        .run(transport.clone())
        .await;

    assert!(report.child.success());
    assert!(report.stopped_gracefully());
    assert!(transport.dial_count() >= 1);
}
