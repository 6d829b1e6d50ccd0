//! Background movie assembly.
//!
//! An [`EncodeJob`] owns one worker thread that hands a finished image sequence
//! to a [`MovieEncoder`]. Once the encoder reaches a terminal state the job
//! optionally removes the source directory, and only then signals completion.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared with an encode worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an encoder needs to turn a directory of frames into a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub source_directory: PathBuf,
    /// printf-style file pattern inside `source_directory`, e.g. `frame_%06d.png`.
    pub frame_pattern: String,
    pub frame_rate: u32,
    pub output: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encode was cancelled")]
    Cancelled,
    #[error("movie encoder `{0}` was not found on PATH")]
    MissingEncoder(String),
    #[error("no frames to encode in {}", .0.display())]
    NoFrames(PathBuf),
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("encoder I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Turns an image sequence into a single movie file.
pub trait MovieEncoder: Send + Sync {
    /// Runs to completion or until `cancel` is observed. Implementations should
    /// check the token between progress steps.
    fn encode(&self, request: &EncodeRequest, cancel: &CancelToken) -> Result<PathBuf, EncodeError>;
}

/// Shells out to the system `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    codec: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec: "libx264".to_string(),
        }
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl MovieEncoder for FfmpegEncoder {
    fn encode(&self, request: &EncodeRequest, cancel: &CancelToken) -> Result<PathBuf, EncodeError> {
        if cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }
        if !request.source_directory.is_dir() {
            return Err(EncodeError::NoFrames(request.source_directory.clone()));
        }
        ensure_parent_dir(&request.output)?;

        let mut command = Command::new(&self.program);
        command
            .arg("-y")
            .args(["-loglevel", "error", "-framerate"])
            .arg(request.frame_rate.max(1).to_string())
            .args(["-start_number", "0", "-i"])
            .arg(request.source_directory.join(&request.frame_pattern))
            .args(["-an", "-c:v", self.codec.as_str(), "-pix_fmt", "yuv420p"])
            // yuv420p needs even dimensions.
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .arg(&request.output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(program = %self.program.display(), output = %request.output.display(), "spawning movie encoder");
        let mut child = command.spawn().map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                EncodeError::MissingEncoder(self.program.display().to_string())
            } else {
                EncodeError::Io(err)
            }
        })?;

        // The pipe is read while the child runs so a chatty encoder cannot
        // fill it and stall.
        let stderr = match child.stderr.take().map(spawn_stderr_reader).transpose() {
            Ok(reader) => reader,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EncodeError::Io(err));
            }
        };
        let collect = |reader: Option<JoinHandle<String>>| {
            reader
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default()
        };

        loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                collect(stderr);
                let _ = fs::remove_file(&request.output);
                return Err(EncodeError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) if status.success() => {
                    collect(stderr);
                    return Ok(request.output.clone());
                }
                Ok(Some(status)) => {
                    return Err(EncodeError::Failed {
                        status,
                        stderr: collect(stderr).trim().to_string(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    collect(stderr);
                    return Err(EncodeError::Io(err));
                }
            }
        }
    }
}

fn spawn_stderr_reader(mut pipe: ChildStderr) -> io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("saverlab-encode-stderr".into())
        .spawn(move || {
            let mut output = String::new();
            if let Err(err) = pipe.read_to_string(&mut output) {
                debug!("stopped reading encoder output: {err}");
            }
            output
        })
}

pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Observable state of the most recent encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum EncodeStatus {
    Idle,
    Running,
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

impl EncodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_) | Self::Cancelled)
    }
}

/// A movie assembly running on its own thread.
#[derive(Debug)]
pub struct EncodeJob {
    request: EncodeRequest,
    cancel: CancelToken,
    status_rx: Receiver<EncodeStatus>,
    handle: Option<JoinHandle<()>>,
    terminal: Option<EncodeStatus>,
}

impl EncodeJob {
    pub fn spawn(
        encoder: Arc<dyn MovieEncoder>,
        request: EncodeRequest,
        delete_source: bool,
    ) -> io::Result<Self> {
        let (status_tx, status_rx) = bounded(1);
        let cancel = CancelToken::new();
        let worker_request = request.clone();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("saverlab-encode".into())
            .spawn(move || {
                let status = run_encode(encoder.as_ref(), &worker_request, &worker_cancel);
                if delete_source {
                    remove_source_directory(&worker_request.source_directory);
                }
                let _ = status_tx.send(status);
            })?;

        info!(
            source = %request.source_directory.display(),
            output = %request.output.display(),
            frame_rate = request.frame_rate,
            delete_source,
            "movie encode started"
        );
        Ok(Self {
            request,
            cancel,
            status_rx,
            handle: Some(handle),
            terminal: None,
        })
    }

    pub fn request(&self) -> &EncodeRequest {
        &self.request
    }

    /// Asks the worker to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Non-blocking status check.
    pub fn try_status(&mut self) -> EncodeStatus {
        if let Some(status) = &self.terminal {
            return status.clone();
        }
        match self.status_rx.try_recv() {
            Ok(status) => self.finish(status),
            Err(TryRecvError::Empty) => EncodeStatus::Running,
            Err(TryRecvError::Disconnected) => self.finish(EncodeStatus::Failed(
                "encode worker exited without reporting".to_string(),
            )),
        }
    }

    /// Blocks until the worker reaches a terminal state.
    pub fn wait(&mut self) -> EncodeStatus {
        if let Some(status) = &self.terminal {
            return status.clone();
        }
        let status = self.status_rx.recv().unwrap_or_else(|_| {
            EncodeStatus::Failed("encode worker exited without reporting".to_string())
        });
        self.finish(status)
    }

    fn finish(&mut self, status: EncodeStatus) -> EncodeStatus {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("encode worker panicked");
            }
        }
        self.terminal = Some(status.clone());
        status
    }
}

impl Drop for EncodeJob {
    fn drop(&mut self) {
        if self.terminal.is_none() {
            self.cancel();
            self.wait();
        }
    }
}

fn run_encode(encoder: &dyn MovieEncoder, request: &EncodeRequest, cancel: &CancelToken) -> EncodeStatus {
    match encoder.encode(request, cancel) {
        Ok(path) => {
            info!(movie = %path.display(), "movie encode completed");
            EncodeStatus::Completed(path)
        }
        Err(EncodeError::Cancelled) => {
            info!(source = %request.source_directory.display(), "movie encode cancelled");
            EncodeStatus::Cancelled
        }
        Err(err) => {
            error!(source = %request.source_directory.display(), "movie encode failed: {err}");
            EncodeStatus::Failed(err.to_string())
        }
    }
}

pub(crate) fn remove_source_directory(directory: &Path) {
    match fs::remove_dir_all(directory) {
        Ok(()) => debug!(directory = %directory.display(), "removed recorded images"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            directory = %directory.display(),
            "failed to remove recorded images: {err}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct StubEncoder {
        result: Mutex<Option<Result<(), String>>>,
    }

    impl MovieEncoder for StubEncoder {
        fn encode(&self, request: &EncodeRequest, _cancel: &CancelToken) -> Result<PathBuf, EncodeError> {
            assert!(request.source_directory.is_dir(), "source must exist during encode");
            match self.result.lock().unwrap().take() {
                Some(Ok(())) => {
                    fs::write(&request.output, b"movie")?;
                    Ok(request.output.clone())
                }
                Some(Err(message)) => Err(EncodeError::Io(io::Error::other(message))),
                None => Err(EncodeError::Cancelled),
            }
        }
    }

    fn request_in(root: &Path) -> EncodeRequest {
        let source = root.join("frames");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("frame_000000.png"), b"png").unwrap();
        EncodeRequest {
            source_directory: source,
            frame_pattern: "frame_%06d.png".into(),
            frame_rate: 30,
            output: root.join("frames.mov"),
        }
    }

    #[test]
    fn completed_encode_deletes_source_when_asked() {
        let dir = tempdir().unwrap();
        let request = request_in(dir.path());
        let encoder = Arc::new(StubEncoder {
            result: Mutex::new(Some(Ok(()))),
        });
        let mut job = EncodeJob::spawn(encoder, request.clone(), true).unwrap();
        assert_eq!(job.wait(), EncodeStatus::Completed(request.output.clone()));
        assert!(!request.source_directory.exists());
        assert!(request.output.exists());
    }

    #[test]
    fn failed_encode_keeps_source_when_not_asked_to_delete() {
        let dir = tempdir().unwrap();
        let request = request_in(dir.path());
        let encoder = Arc::new(StubEncoder {
            result: Mutex::new(Some(Err("disk full".into()))),
        });
        let mut job = EncodeJob::spawn(encoder, request.clone(), false).unwrap();
        assert!(matches!(job.wait(), EncodeStatus::Failed(message) if message.contains("disk full")));
        assert!(request.source_directory.exists());
        // Status is cached once terminal.
        assert!(matches!(job.try_status(), EncodeStatus::Failed(_)));
    }

    #[test]
    fn failed_encode_still_deletes_when_asked() {
        let dir = tempdir().unwrap();
        let request = request_in(dir.path());
        let encoder = Arc::new(StubEncoder {
            result: Mutex::new(Some(Err("bad codec".into()))),
        });
        let mut job = EncodeJob::spawn(encoder, request.clone(), true).unwrap();
        assert!(matches!(job.wait(), EncodeStatus::Failed(_)));
        assert!(!request.source_directory.exists());
    }

    #[test]
    fn missing_ffmpeg_binary_is_reported() {
        let dir = tempdir().unwrap();
        let request = request_in(dir.path());
        let encoder = FfmpegEncoder::new().with_program(dir.path().join("no-such-ffmpeg"));
        assert!(!encoder.is_available());
        let err = encoder.encode(&request, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, EncodeError::MissingEncoder(_)));
    }

    #[cfg(unix)]
    #[test]
    fn noisy_encoder_failure_reports_all_of_its_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let request = request_in(dir.path());
        let program = dir.path().join("noisy-encoder");
        fs::write(
            &program,
            "#!/bin/sh\nhead -c 200000 /dev/zero | tr '\\000' x >&2\nexit 3\n",
        )
        .unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        let encoder = FfmpegEncoder::new().with_program(&program);

        // Another test forking while the script was open for writing makes
        // exec fail with ETXTBSY for a moment.
        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match encoder.encode(&request, &CancelToken::new()) {
                Err(EncodeError::Io(err)) if err.raw_os_error() == Some(26) && attempts < 20 => {
                    thread::sleep(Duration::from_millis(50));
                }
                other => break other,
            }
        };
        match result {
            Err(EncodeError::Failed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr.len(), 200_000);
                assert!(stderr.chars().all(|c| c == 'x'));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn pre_cancelled_ffmpeg_encode_returns_cancelled() {
        let dir = tempdir().unwrap();
        let request = request_in(dir.path());
        let token = CancelToken::new();
        token.cancel();
        let err = FfmpegEncoder::new().encode(&request, &token).unwrap_err();
        assert!(matches!(err, EncodeError::Cancelled));
    }
}
