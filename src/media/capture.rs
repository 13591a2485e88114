//! Frame capture
//!
//! The camera driver is an external collaborator. This module defines the
//! boundary ([`FrameSource`]) and the capture session that pumps frames from
//! a source into the transcoder until it is told to stop.

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::transcoder::Transcoder;

/// Capture geometry and timing
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub width: u16,
    pub height: u16,
    pub framerate: u32,

    /// Delay between opening the device and starting capture
    pub warmup: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            framerate: 24,
            warmup: Duration::from_secs(1),
        }
    }
}

impl CaptureConfig {
    /// Size in bytes of one YUV420 planar frame
    pub fn frame_size(&self) -> usize {
        let luma = self.width as usize * self.height as usize;
        luma + luma / 2
    }

    /// Time between two frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.framerate.max(1)
    }
}

/// A device or program producing raw YUV420 frames
pub trait FrameSource: Send + 'static {
    /// Acquire the device and configure it for `config`
    fn open(&mut self, config: &CaptureConfig) -> impl Future<Output = Result<()>> + Send;

    /// Next frame, or `None` once the source has no more frames
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Release the device
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Synthetic moving gradient, paced at the configured frame rate
#[derive(Default)]
pub struct TestPattern {
    config: Option<CaptureConfig>,
    ticker: Option<Interval>,
    frame_index: u64,
}

impl TestPattern {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(config: &CaptureConfig, index: u64) -> Bytes {
        let width = config.width as usize;
        let height = config.height as usize;
        let mut frame = BytesMut::zeroed(config.frame_size());

        let shift = (index * 2) as usize;
        let (luma, chroma) = frame.split_at_mut(width * height);
        for (i, px) in luma.iter_mut().enumerate() {
            let (x, y) = (i % width, i / width);
            *px = ((x + y + shift) & 0xff) as u8;
        }
        chroma.fill(128);

        frame.freeze()
    }
}

impl FrameSource for TestPattern {
    async fn open(&mut self, config: &CaptureConfig) -> Result<()> {
        let mut ticker = tokio::time::interval(config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.ticker = Some(ticker);
        self.config = Some(config.clone());
        self.frame_index = 0;

        tracing::info!(
            width = config.width,
            height = config.height,
            framerate = config.framerate,
            "Test pattern source opened"
        );
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let (Some(config), Some(ticker)) = (self.config.as_ref(), self.ticker.as_mut()) else {
            return Err(Error::CaptureUnavailable("test pattern not opened".into()));
        };

        ticker.tick().await;
        let frame = Self::render(config, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    async fn close(&mut self) {
        self.ticker = None;
        self.config = None;
    }
}

/// Frames read from the stdout of an external capture program
///
/// The program must write back-to-back YUV420 frames of exactly the
/// configured size. End of its output ends the capture.
pub struct CommandSource {
    program: String,
    args: Option<Vec<String>>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frame_size: usize,
}

impl CommandSource {
    /// Run `program` with arguments derived from the capture config
    ///
    /// The generated arguments follow `rpicam-vid` conventions.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: None,
            child: None,
            stdout: None,
            frame_size: 0,
        }
    }

    /// Use an explicit argument list
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    fn build_args(&self, config: &CaptureConfig) -> Vec<String> {
        if let Some(ref args) = self.args {
            return args.clone();
        }

        vec![
            "--nopreview".to_string(),
            "--timeout".to_string(),
            "0".to_string(),
            "--codec".to_string(),
            "yuv420".to_string(),
            "--width".to_string(),
            config.width.to_string(),
            "--height".to_string(),
            config.height.to_string(),
            "--framerate".to_string(),
            config.framerate.to_string(),
            "--output".to_string(),
            "-".to_string(),
        ]
    }
}

impl FrameSource for CommandSource {
    async fn open(&mut self, config: &CaptureConfig) -> Result<()> {
        let args = self.build_args(config);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::CaptureUnavailable(format!("{}: {}", self.program, e)))?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.frame_size = config.frame_size();

        tracing::info!(program = %self.program, args = ?args, "Capture command started");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::CaptureUnavailable("capture command not running".into()))?;

        let mut frame = BytesMut::zeroed(self.frame_size);
        match stdout.read_exact(&mut frame).await {
            Ok(_) => Ok(Some(frame.freeze())),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(Error::CaptureFailed(e)),
        }
    }

    async fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(program = %self.program, error = %e, "Capture command already gone");
            }
        }
    }
}

/// A running capture feeding the transcoder
pub struct CaptureSession {
    stop: CancellationToken,
    handle: Option<JoinHandle<Result<u64>>>,
}

impl CaptureSession {
    /// Start pumping frames from an opened source into the transcoder
    pub fn start<S: FrameSource>(source: S, transcoder: Arc<Transcoder>) -> Self {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(pump(source, transcoder, stop.clone()));

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Check whether the capture task is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait up to `timeout` for the capture to fail
    ///
    /// Returns `Ok(())` if capture is still running when the timeout
    /// expires, otherwise the reason it stopped.
    pub async fn wait(&mut self, timeout: Duration) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::CaptureEnded);
        };

        let joined = tokio::time::timeout(timeout, handle).await;
        match joined {
            Err(_elapsed) => Ok(()),
            Ok(joined) => {
                self.handle = None;
                match joined? {
                    Ok(_) => Err(Error::CaptureEnded),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Stop capturing and wait for the capture task to end
    ///
    /// A frame already being written is completed first. No frame is
    /// written to the transcoder after this returns. Returns the
    /// number of frames captured, or 0 if the session had already ended.
    pub async fn stop(&mut self) -> Result<u64> {
        self.stop.cancel();

        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(0),
        }
    }
}

async fn pump<S: FrameSource>(
    mut source: S,
    transcoder: Arc<Transcoder>,
    stop: CancellationToken,
) -> Result<u64> {
    let result = pump_frames(&mut source, &transcoder, &stop).await;
    source.close().await;

    match result {
        Ok(frames) => tracing::info!(frames = frames, "Capture stopped"),
        Err(ref e) => tracing::warn!(error = %e, "Capture failed"),
    }
    result
}

async fn pump_frames<S: FrameSource>(
    source: &mut S,
    transcoder: &Transcoder,
    stop: &CancellationToken,
) -> Result<u64> {
    let mut frames = 0u64;

    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(frames),
            frame = source.next_frame() => frame?,
        };

        let Some(frame) = frame else {
            return Err(Error::CaptureEnded);
        };

        // A frame can exceed the pipe buffer; cancelling mid-write would
        // leave a partial frame in the transcoder input.
        transcoder.write(&frame).await?;
        frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CaptureConfig {
        CaptureConfig {
            width: 8,
            height: 8,
            framerate: 100,
            warmup: Duration::ZERO,
        }
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(CaptureConfig::default().frame_size(), 320 * 240 * 3 / 2);
        assert_eq!(small().frame_size(), 96);
    }

    #[test]
    fn test_frame_interval() {
        let config = CaptureConfig {
            framerate: 25,
            ..Default::default()
        };

        assert_eq!(config.frame_interval(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_pattern_requires_open() {
        let mut source = TestPattern::new();

        assert!(matches!(
            source.next_frame().await,
            Err(Error::CaptureUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_pattern_frames_move() {
        let mut source = TestPattern::new();
        source.open(&small()).await.unwrap();

        let first = source.next_frame().await.unwrap().unwrap();
        let second = source.next_frame().await.unwrap().unwrap();

        assert_eq!(first.len(), 96);
        assert_ne!(first[..64], second[..64]);
        assert!(first[64..].iter().all(|b| *b == 128));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source_reads_exact_frames() {
        let mut source = CommandSource::new("head").args(["-c", "192", "/dev/zero"]);
        source.open(&small()).await.unwrap();

        assert_eq!(source.next_frame().await.unwrap().unwrap().len(), 96);
        assert_eq!(source.next_frame().await.unwrap().unwrap().len(), 96);
        assert!(source.next_frame().await.unwrap().is_none());

        source.close().await;
    }

    #[tokio::test]
    async fn test_command_source_missing_program() {
        let mut source = CommandSource::new("/nonexistent/camera");

        assert!(matches!(
            source.open(&small()).await,
            Err(Error::CaptureUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_stop_then_flush() {
        use crate::media::transcoder::TranscoderConfig;

        let config = TranscoderConfig::default().program("cat").args(Vec::<String>::new());
        let mut transcoder = Transcoder::spawn(&config).unwrap();
        let mut output = transcoder.take_output().unwrap();
        let reader = tokio::spawn(async move {
            let mut total = 0;
            loop {
                let chunk = output.read_chunk().await.unwrap();
                if chunk.is_empty() {
                    break total;
                }
                total += chunk.len();
            }
        });
        let transcoder = Arc::new(transcoder);

        let mut source = TestPattern::new();
        source.open(&small()).await.unwrap();
        let mut session = CaptureSession::start(source, Arc::clone(&transcoder));

        assert!(session.wait(Duration::from_millis(100)).await.is_ok());
        assert!(session.is_running());

        let frames = session.stop().await.unwrap();
        assert!(frames > 0);
        assert!(!session.is_running());
        assert_eq!(session.stop().await.unwrap(), 0);

        transcoder.flush().await;
        assert_eq!(reader.await.unwrap(), frames as usize * 96);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_never_splits_a_frame() {
        use crate::media::transcoder::TranscoderConfig;

        // Full-size frames are larger than a pipe buffer
        let capture = CaptureConfig {
            framerate: 200,
            ..Default::default()
        };
        let frame_size = capture.frame_size();

        let config = TranscoderConfig::default().program("cat").args(Vec::<String>::new());
        let mut transcoder = Transcoder::spawn(&config).unwrap();
        let mut output = transcoder.take_output().unwrap();
        let reader = tokio::spawn(async move {
            let mut total = 0;
            loop {
                let chunk = output.read_chunk().await.unwrap();
                if chunk.is_empty() {
                    break total;
                }
                total += chunk.len();
            }
        });
        let transcoder = Arc::new(transcoder);

        let mut source = TestPattern::new();
        source.open(&capture).await.unwrap();
        let mut session = CaptureSession::start(source, Arc::clone(&transcoder));

        for _ in 0..5 {
            assert!(session.wait(Duration::from_millis(30)).await.is_ok());
        }
        let frames = session.stop().await.unwrap();
        transcoder.flush().await;

        let total = reader.await.unwrap();
        assert_eq!(total % frame_size, 0);
        assert_eq!(total, frames as usize * frame_size);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_reports_closed_pipe() {
        use crate::media::transcoder::TranscoderConfig;

        let config = TranscoderConfig::default().program("cat").args(Vec::<String>::new());
        let transcoder = Arc::new(Transcoder::spawn(&config).unwrap());
        transcoder.flush().await;

        let mut source = TestPattern::new();
        source.open(&small()).await.unwrap();
        let mut session = CaptureSession::start(source, transcoder);

        let result = session.wait(Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::PipeClosed)));
        assert!(matches!(session.wait(Duration::ZERO).await, Err(Error::CaptureEnded)));
    }
}
