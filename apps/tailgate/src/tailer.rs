use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tail_transport::{Frame, TailConnection};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, trace, warn};

use crate::context::ClientContext;
use crate::error::{AttemptError, FileError};
use crate::termination::TerminationSignal;

/// How a tail pass ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailOutcome {
    /// Termination was requested and everything up to `offset` has been sent.
    Terminated { offset: u64 },
    /// Termination was requested before the log file was ever created.
    FileNeverAppeared,
}

/// Where streaming starts given the local file size and the collector's offset.
///
/// The collector already has `remote_offset` bytes, so only the delta is sent.
/// When the local file is not longer than that (truncated or replaced since the
/// collector last saw it) streaming starts at the local end: bytes that are no
/// longer on disk are never invented.
pub fn start_offset(local_size: u64, remote_offset: u64) -> u64 {
    if local_size > remote_offset {
        remote_offset
    } else {
        local_size
    }
}

/// Streams the appended tail of one log file over one connection.
pub struct ResumableTailer<'a> {
    path: &'a Path,
    poll_interval: Duration,
    chunk_size: usize,
    termination: &'a TerminationSignal,
    bytes_sent: u64,
}

impl<'a> ResumableTailer<'a> {
    pub fn new(ctx: &'a ClientContext) -> Self {
        let config = ctx.config();
        Self {
            path: &config.logfile,
            poll_interval: config.poll_interval,
            chunk_size: config.chunk_size.max(1),
            termination: ctx.termination(),
            bytes_sent: 0,
        }
    }

    /// Bytes forwarded by this tailer so far, including before a failure.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Runs until termination at end of file, or until the file, the
    /// connection or the transport fails.
    pub async fn tail<C>(
        &mut self,
        conn: &mut C,
        remote_offset: u64,
    ) -> Result<TailOutcome, AttemptError>
    where
        C: TailConnection + ?Sized,
    {
        let Some(mut file) = self.open().await? else {
            return Ok(TailOutcome::FileNeverAppeared);
        };
        let cursor = self.position(&mut file, remote_offset).await?;
        self.stream(&mut file, conn, cursor).await
    }

    async fn open(&self) -> Result<Option<File>, FileError> {
        let mut announced = false;
        loop {
            match File::open(self.path).await {
                Ok(file) => {
                    info!(path = %self.path.display(), "log file open for reading");
                    return Ok(Some(file));
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    if !announced {
                        info!(path = %self.path.display(), "log file does not exist yet; waiting");
                        announced = true;
                    }
                    if self.termination.is_requested() {
                        info!(
                            path = %self.path.display(),
                            "termination requested before log file appeared"
                        );
                        return Ok(None);
                    }
                    self.termination.sleep(self.poll_interval).await;
                }
                Err(source) => {
                    return Err(FileError::Open {
                        path: self.path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }

    async fn position(&self, file: &mut File, remote_offset: u64) -> Result<u64, FileError> {
        let local_size = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|source| self.seek_error(remote_offset, source))?;
        let start = start_offset(local_size, remote_offset);
        if start < local_size {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|source| self.seek_error(start, source))?;
        }
        if local_size < remote_offset {
            warn!(
                path = %self.path.display(),
                local_size,
                remote_offset,
                "collector holds more than the local file; tailing from local end"
            );
        }
        debug!(local_size, remote_offset, start, "tail cursor initialised");
        Ok(start)
    }

    async fn stream<C>(
        &mut self,
        file: &mut File,
        conn: &mut C,
        mut cursor: u64,
    ) -> Result<TailOutcome, AttemptError>
    where
        C: TailConnection + ?Sized,
    {
        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let read = match file.read(&mut buffer).await {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(FileError::Read {
                        path: self.path.to_path_buf(),
                        offset: cursor,
                        source,
                    }
                    .into())
                }
            };

            if read == 0 {
                if self.termination.is_requested() {
                    info!(offset = cursor, sent = self.bytes_sent, "end of log reached after termination request");
                    return Ok(TailOutcome::Terminated { offset: cursor });
                }
                if !conn.is_connected() {
                    return Err(AttemptError::Disconnected { offset: cursor });
                }
                self.termination.sleep(self.poll_interval).await;
                continue;
            }

            let chunk = Bytes::copy_from_slice(&buffer[..read]);
            conn.send(Frame::Binary(chunk))
                .await
                .map_err(|source| AttemptError::Send {
                    offset: cursor,
                    len: read,
                    source,
                })?;
            cursor += read as u64;
            self.bytes_sent += read as u64;
            trace!(offset = cursor, bytes = read, "forwarded chunk");
        }
    }

    fn seek_error(&self, offset: u64, source: io::Error) -> FileError {
        FileError::Seek {
            path: self.path.to_path_buf(),
            offset,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use std::io::Write;
    use std::path::PathBuf;
    use tail_transport::memory::{pair, MemoryPeer};

    const WAIT: Duration = Duration::from_secs(5);

    fn context(path: PathBuf, chunk_size: usize) -> ClientContext {
        let config = ClientConfig::new(path, "ws://collector", vec!["true".into()])
            .with_poll_interval(Duration::from_millis(10))
            .with_chunk_size(chunk_size);
        ClientContext::new(config)
    }

    fn append(path: &Path, bytes: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open for append");
        file.write_all(bytes).expect("append");
    }

    async fn next_binary(peer: &mut MemoryPeer) -> Vec<u8> {
        match peer.recv_timeout(WAIT).await {
            Some(Frame::Binary(bytes)) => bytes.to_vec(),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[test]
    fn start_offset_resumes_or_clamps_to_local_end() {
        let cases = [
            (0, 0, 0),
            (10, 0, 0),
            (10, 4, 4),
            (10, 9, 9),
            (10, 10, 10),
            (10, 25, 10),
            (0, 25, 0),
        ];
        for (local_size, remote_offset, expected) in cases {
            assert_eq!(
                start_offset(local_size, remote_offset),
                expected,
                "local {local_size}, remote {remote_offset}"
            );
        }
    }

    #[tokio::test]
    async fn resumes_from_remote_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        append(&path, b"0123456789");
        let ctx = context(path, 2000);
        let (mut conn, mut peer) = pair();

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut tailer = ResumableTailer::new(&ctx);
                let outcome = tailer.tail(&mut conn, 4).await;
                (outcome, tailer.bytes_sent())
            })
        };

        assert_eq!(next_binary(&mut peer).await, b"456789");
        ctx.termination().request();
        let (outcome, sent) = task.await.unwrap();
        assert_eq!(outcome.unwrap(), TailOutcome::Terminated { offset: 10 });
        assert_eq!(sent, 6);
    }

    #[tokio::test]
    async fn zero_offset_sends_whole_file_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let content: Vec<u8> = (0..4500u32).map(|i| (i % 251) as u8).collect();
        append(&path, &content);
        let ctx = context(path, 2000);
        ctx.termination().request();
        let (mut conn, mut peer) = pair();

        let mut tailer = ResumableTailer::new(&ctx);
        let outcome = tailer.tail(&mut conn, 0).await.expect("tail");
        assert_eq!(outcome, TailOutcome::Terminated { offset: 4500 });

        let mut sizes = Vec::new();
        let mut received = Vec::new();
        while let Some(Frame::Binary(bytes)) = peer.recv_timeout(Duration::from_millis(50)).await {
            sizes.push(bytes.len());
            received.extend_from_slice(&bytes);
        }
        assert_eq!(sizes, vec![2000, 2000, 500]);
        assert_eq!(received, content);
    }

    #[tokio::test]
    async fn remote_ahead_of_local_tails_from_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        append(&path, b"old");
        let ctx = context(path.clone(), 2000);
        let (mut conn, mut peer) = pair();

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ResumableTailer::new(&ctx).tail(&mut conn, 500).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, b"new");
        assert_eq!(next_binary(&mut peer).await, b"new");
        ctx.termination().request();
        assert_eq!(task.await.unwrap().unwrap(), TailOutcome::Terminated { offset: 6 });
    }

    #[tokio::test]
    async fn waits_for_file_then_streams_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.log");
        let ctx = context(path.clone(), 2000);
        let (mut conn, mut peer) = pair();

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ResumableTailer::new(&ctx).tail(&mut conn, 0).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, b"A");
        assert_eq!(next_binary(&mut peer).await, b"A");
        append(&path, b"B");
        assert_eq!(next_binary(&mut peer).await, b"B");

        ctx.termination().request();
        assert_eq!(task.await.unwrap().unwrap(), TailOutcome::Terminated { offset: 2 });
    }

    #[tokio::test]
    async fn missing_file_at_termination_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().join("never.log"), 2000);
        let (mut conn, _peer) = pair();

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ResumableTailer::new(&ctx).tail(&mut conn, 0).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.termination().request();

        let outcome = tokio::time::timeout(WAIT, task).await.expect("prompt exit");
        assert_eq!(outcome.unwrap().unwrap(), TailOutcome::FileNeverAppeared);
    }

    #[tokio::test]
    async fn unreadable_path_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        append(&blocker, b"x");
        let ctx = context(blocker.join("run.log"), 2000);
        let (mut conn, _peer) = pair();

        let err = ResumableTailer::new(&ctx).tail(&mut conn, 0).await.unwrap_err();
        assert!(matches!(err, AttemptError::File(FileError::Open { .. })), "{err}");
    }

    #[tokio::test]
    async fn send_failure_ends_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        append(&path, b"payload");
        let ctx = context(path, 2000);
        let (mut conn, peer) = pair();
        drop(peer);

        let err = ResumableTailer::new(&ctx).tail(&mut conn, 0).await.unwrap_err();
        assert!(matches!(err, AttemptError::Send { offset: 0, len: 7, .. }), "{err}");
    }

    #[tokio::test]
    async fn idle_tail_notices_departed_collector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        append(&path, b"abc");
        let ctx = context(path, 2000);
        let (mut conn, mut peer) = pair();

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ResumableTailer::new(&ctx).tail(&mut conn, 0).await })
        };
        assert_eq!(next_binary(&mut peer).await, b"abc");
        drop(peer);

        let err = tokio::time::timeout(WAIT, task)
            .await
            .expect("prompt exit")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, AttemptError::Disconnected { offset: 3 }), "{err}");
    }
}
