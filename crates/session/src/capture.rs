//! Recording rendered frames to an image sequence.
//!
//! Frames are handed to a dedicated writer thread one at a time. If the previous
//! write has not reported back when the next frame arrives, that frame is
//! dropped; the render loop never waits on disk. Every frame of a recording
//! is stored at the size of its first frame, so a display-mode change midway
//! still yields a uniform sequence for the encoder.
//!
//! ```text
//!   offer_frame ──bounded(1)──▶ writer thread ──▶ FrameSink::write_frame
//!        ▲                            │
//!        └────────── results ◀────────┘
//!
//!   stop_recording ──▶ join writer ──▶ EncodeJob (optional) ──▶ delete (optional)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::encode::{remove_source_directory, EncodeJob, EncodeRequest, EncodeStatus, MovieEncoder};

pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// File name of the frame at `index` inside a recording directory.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:06}.png")
}

/// Movie written next to a recording directory: `<directory>.mov`.
pub fn movie_path_for(directory: &Path) -> PathBuf {
    let mut name = directory.as_os_str().to_owned();
    name.push(".mov");
    PathBuf::from(name)
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("a recording is already active")]
    AlreadyActive,
    #[error("no recording is active")]
    NotRecording,
    #[error("the previous recording is still being assembled into a movie")]
    EncodeInProgress,
    #[error("failed to prepare recording directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write frame {}: {message}", path.display())]
    Write { path: PathBuf, message: String },
    #[error("frame writer stopped unexpectedly")]
    WriterGone,
    #[error("failed to start background worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Persists a single captured frame.
pub trait FrameSink: Send + Sync {
    fn write_frame(&self, path: &Path, frame: &RgbaImage) -> Result<(), CaptureError>;
}

/// Writes frames as PNG files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngFrameSink;

impl FrameSink for PngFrameSink {
    fn write_frame(&self, path: &Path, frame: &RgbaImage) -> Result<(), CaptureError> {
        frame
            .save_with_format(path, ImageFormat::Png)
            .map_err(|err| CaptureError::Write {
                path: path.to_path_buf(),
                message: err.to_string(),
            })
    }
}

/// What happened to a frame offered to the recorder.
#[derive(Debug)]
pub enum OfferOutcome {
    Queued { index: u64 },
    /// The previous write was still in flight.
    Dropped,
    /// No recording is active.
    Inactive,
    /// A write failed and the recording was torn down.
    Aborted(CaptureError),
}

/// Result of stopping a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingSummary {
    pub directory: PathBuf,
    pub frames: u64,
    pub dropped: u64,
    /// Set when movie assembly was started.
    pub movie: Option<PathBuf>,
}

struct WriteRequest {
    index: u64,
    path: PathBuf,
    frame: RgbaImage,
}

struct WriteResult {
    index: u64,
    outcome: Result<(), CaptureError>,
}

struct CaptureJob {
    directory: PathBuf,
    next_index: u64,
    in_progress: bool,
    /// Pinned by the first queued frame.
    frame_size: Option<(u32, u32)>,
    captured: u64,
    dropped: u64,
    requests: Option<Sender<WriteRequest>>,
    results: Receiver<WriteResult>,
    writer: Option<JoinHandle<()>>,
}

impl CaptureJob {
    fn start(directory: PathBuf, sink: Arc<dyn FrameSink>) -> Result<Self, CaptureError> {
        fs::create_dir_all(&directory).map_err(|source| CaptureError::Directory {
            path: directory.clone(),
            source,
        })?;

        let (request_tx, request_rx) = bounded::<WriteRequest>(1);
        let (result_tx, result_rx) = bounded::<WriteResult>(1);
        let writer = thread::Builder::new()
            .name("saverlab-capture".into())
            .spawn(move || {
                for request in request_rx.iter() {
                    let outcome = sink.write_frame(&request.path, &request.frame);
                    let result = WriteResult {
                        index: request.index,
                        outcome,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            })
            .map_err(CaptureError::Spawn)?;

        Ok(Self {
            directory,
            next_index: 0,
            in_progress: false,
            frame_size: None,
            captured: 0,
            dropped: 0,
            requests: Some(request_tx),
            results: result_rx,
            writer: Some(writer),
        })
    }

    /// Collects a finished write without blocking.
    fn drain(&mut self) -> Result<(), CaptureError> {
        match self.results.try_recv() {
            Ok(result) => self.complete(result),
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Disconnected) if self.in_progress => {
                self.in_progress = false;
                Err(CaptureError::WriterGone)
            }
            Err(TryRecvError::Disconnected) => Ok(()),
        }
    }

    /// Blocks until the in-flight write, if any, reports back.
    fn flush(&mut self) -> Result<(), CaptureError> {
        if !self.in_progress {
            return Ok(());
        }
        match self.results.recv() {
            Ok(result) => self.complete(result),
            Err(_) => {
                self.in_progress = false;
                Err(CaptureError::WriterGone)
            }
        }
    }

    fn complete(&mut self, result: WriteResult) -> Result<(), CaptureError> {
        self.in_progress = false;
        result.outcome?;
        self.captured += 1;
        debug!(index = result.index, "captured frame written");
        Ok(())
    }

    fn offer(&mut self, frame: &RgbaImage) -> Result<Option<u64>, CaptureError> {
        self.drain()?;
        if self.in_progress {
            self.dropped += 1;
            debug!(
                next_index = self.next_index,
                dropped = self.dropped,
                "previous frame still being written; dropping frame"
            );
            return Ok(None);
        }

        let index = self.next_index;
        let request = WriteRequest {
            index,
            path: self.directory.join(frame_file_name(index)),
            frame: self.fit(frame),
        };
        let sender = self.requests.as_ref().ok_or(CaptureError::WriterGone)?;
        sender.send(request).map_err(|_| CaptureError::WriterGone)?;
        self.in_progress = true;
        self.next_index += 1;
        Ok(Some(index))
    }

    fn fit(&mut self, frame: &RgbaImage) -> RgbaImage {
        let (width, height) = *self.frame_size.get_or_insert(frame.dimensions());
        if frame.dimensions() == (width, height) {
            return frame.clone();
        }
        debug!(
            from = ?frame.dimensions(),
            to = ?(width, height),
            "scaling captured frame to the recording size"
        );
        imageops::resize(frame, width, height, FilterType::Triangle)
    }

    /// Closes the request channel, joins the writer and collects its last result.
    fn finish(&mut self) -> Result<(), CaptureError> {
        let flushed = self.flush();
        self.requests.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!(directory = %self.directory.display(), "frame writer panicked");
            }
        }
        flushed
    }
}

impl Drop for CaptureJob {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Snapshots frames to disk and assembles them into a movie.
pub struct FrameCaptureRecorder {
    sink: Arc<dyn FrameSink>,
    encoder: Arc<dyn MovieEncoder>,
    job: Option<CaptureJob>,
    encode: Option<EncodeJob>,
    last_status: EncodeStatus,
    write_failures: u64,
}

impl FrameCaptureRecorder {
    pub fn new(sink: Arc<dyn FrameSink>, encoder: Arc<dyn MovieEncoder>) -> Self {
        Self {
            sink,
            encoder,
            job: None,
            encode: None,
            last_status: EncodeStatus::Idle,
            write_failures: 0,
        }
    }

    /// PNG frames assembled by the system `ffmpeg`.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(PngFrameSink),
            Arc::new(crate::encode::FfmpegEncoder::new()),
        )
    }

    pub fn is_recording(&self) -> bool {
        self.job.is_some()
    }

    pub fn recording_directory(&self) -> Option<&Path> {
        self.job.as_ref().map(|job| job.directory.as_path())
    }

    /// Frames written so far in the active recording.
    pub fn captured_frames(&self) -> u64 {
        self.job.as_ref().map_or(0, |job| job.captured)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.job.as_ref().map_or(0, |job| job.dropped)
    }

    pub fn next_index(&self) -> u64 {
        self.job.as_ref().map_or(0, |job| job.next_index)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn start_recording(&mut self, directory: &Path) -> Result<(), CaptureError> {
        if self.job.is_some() {
            return Err(CaptureError::AlreadyActive);
        }
        if self.encode_status() == EncodeStatus::Running {
            return Err(CaptureError::EncodeInProgress);
        }
        let job = CaptureJob::start(directory.to_path_buf(), Arc::clone(&self.sink))?;
        info!(directory = %directory.display(), "recording started");
        self.job = Some(job);
        Ok(())
    }

    pub fn offer_frame(&mut self, frame: &RgbaImage) -> OfferOutcome {
        let Some(job) = self.job.as_mut() else {
            return OfferOutcome::Inactive;
        };
        match job.offer(frame) {
            Ok(Some(index)) => OfferOutcome::Queued { index },
            Ok(None) => OfferOutcome::Dropped,
            Err(err) => {
                self.abort(&err);
                OfferOutcome::Aborted(err)
            }
        }
    }

    /// Non-blocking check on the in-flight write. Returns the error if the
    /// recording had to be aborted.
    pub fn poll(&mut self) -> Option<CaptureError> {
        let job = self.job.as_mut()?;
        match job.drain() {
            Ok(()) => None,
            Err(err) => {
                self.abort(&err);
                Some(err)
            }
        }
    }

    /// Waits for the in-flight write, so the next offered frame is never dropped.
    pub fn flush(&mut self) -> Result<(), CaptureError> {
        let Some(job) = self.job.as_mut() else {
            return Ok(());
        };
        let flushed = job.flush();
        if let Err(err) = &flushed {
            self.abort(err);
        }
        flushed
    }

    fn abort(&mut self, err: &CaptureError) {
        self.write_failures += 1;
        if let Some(job) = self.job.take() {
            warn!(
                directory = %job.directory.display(),
                captured = job.captured,
                "recording aborted: {err}"
            );
        }
    }

    /// Ends the active recording. The writer thread is joined before any movie
    /// assembly starts, and the image directory is removed only after the
    /// encode (if any) has finished.
    pub fn stop_recording(
        &mut self,
        assemble_movie: bool,
        delete_source_images: bool,
        frame_rate: u32,
    ) -> Result<RecordingSummary, CaptureError> {
        let mut job = self.job.take().ok_or(CaptureError::NotRecording)?;
        if let Err(err) = job.finish() {
            self.write_failures += 1;
            warn!(directory = %job.directory.display(), "recording aborted: {err}");
            return Err(err);
        }

        let mut summary = RecordingSummary {
            directory: job.directory.clone(),
            frames: job.captured,
            dropped: job.dropped,
            movie: None,
        };
        drop(job);
        info!(
            directory = %summary.directory.display(),
            frames = summary.frames,
            dropped = summary.dropped,
            "recording stopped"
        );

        if !assemble_movie || summary.frames == 0 {
            if assemble_movie {
                info!("no frames were captured; skipping movie assembly");
            }
            if delete_source_images {
                remove_source_directory(&summary.directory);
            }
            return Ok(summary);
        }

        let request = EncodeRequest {
            source_directory: summary.directory.clone(),
            frame_pattern: FRAME_PATTERN.to_string(),
            frame_rate: frame_rate.max(1),
            output: movie_path_for(&summary.directory),
        };
        let job = EncodeJob::spawn(Arc::clone(&self.encoder), request, delete_source_images)
            .map_err(CaptureError::Spawn)?;
        summary.movie = Some(job.request().output.clone());
        self.encode = Some(job);
        self.last_status = EncodeStatus::Running;
        Ok(summary)
    }

    /// Status of the most recent encode, without blocking.
    pub fn encode_status(&mut self) -> EncodeStatus {
        if let Some(job) = self.encode.as_mut() {
            let status = job.try_status();
            if status.is_terminal() {
                self.encode = None;
            }
            self.last_status = status;
        }
        self.last_status.clone()
    }

    /// Blocks until the current encode finishes. Returns the last known status
    /// when nothing is running.
    pub fn wait_for_encode(&mut self) -> EncodeStatus {
        if let Some(mut job) = self.encode.take() {
            self.last_status = job.wait();
        }
        self.last_status.clone()
    }

    /// Cancels an in-flight encode and waits for it to reach a terminal state.
    pub fn cancel_if_pending(&mut self) -> Option<EncodeStatus> {
        let mut job = self.encode.take()?;
        job.cancel();
        let status = job.wait();
        self.last_status = status.clone();
        Some(status)
    }
}

impl Drop for FrameCaptureRecorder {
    fn drop(&mut self) {
        self.job.take();
        self.cancel_if_pending();
    }
}

impl std::fmt::Debug for FrameCaptureRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCaptureRecorder")
            .field("recording", &self.recording_directory())
            .field("last_status", &self.last_status)
            .finish_non_exhaustive()
    }
}
