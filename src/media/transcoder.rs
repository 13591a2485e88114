//! External transcoder process
//!
//! Raw YUV420 frames go into the process's stdin; the MPEG-1 elementary
//! stream comes out of its stdout.
//!
//! ```text
//!  capture ──write()──► [stdin] ffmpeg [stdout] ──read_chunk()──► relay
//!                                 │
//!                          reaper task ──► watch<ProcessState>
//! ```
//!
//! A reaper task owns the child and publishes its exit on a watch channel,
//! so both the relay (poll for exit) and the supervisor (wait for exit) can
//! observe it without sharing the `Child`.

use std::io;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};
use crate::protocol::CHUNK_SIZE;

/// Transcoder launch configuration
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// Program to run
    pub program: String,

    /// Input frame width
    pub width: u16,

    /// Input frame height
    pub height: u16,

    /// Input (and output) frame rate
    pub framerate: u32,

    /// Target video bitrate, in the program's notation
    pub bitrate: String,

    /// Replaces the generated argument list when set
    pub args: Option<Vec<String>>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            width: 320,
            height: 240,
            framerate: 24,
            bitrate: "800k".to_string(),
            args: None,
        }
    }
}

impl TranscoderConfig {
    /// Create a config for the given frame geometry
    pub fn new(width: u16, height: u16, framerate: u32) -> Self {
        Self {
            width,
            height,
            framerate,
            ..Default::default()
        }
    }

    /// Set the program to run
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the target bitrate
    pub fn bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
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

    /// Arguments passed to the program
    pub fn build_args(&self) -> Vec<String> {
        if let Some(ref args) = self.args {
            return args.clone();
        }

        let size = format!("{}x{}", self.width, self.height);
        let rate = self.framerate.to_string();

        [
            "-f",
            "rawvideo",
            "-pix_fmt",
            "yuv420p",
            "-s",
            size.as_str(),
            "-r",
            rate.as_str(),
            "-i",
            "-",
            "-f",
            "mpeg1video",
            "-b:v",
            self.bitrate.as_str(),
            "-r",
            rate.as_str(),
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Lifecycle of the external process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exit code, `None` if killed by a signal or the wait itself failed
    Exited(Option<i32>),
}

/// Handle to a running transcoder process
pub struct Transcoder {
    program: String,
    pid: Option<u32>,
    input: Mutex<Option<ChildStdin>>,
    output: Option<TranscoderOutput>,
    state: watch::Receiver<ProcessState>,
}

impl Transcoder {
    /// Launch the transcoder
    pub fn spawn(config: &TranscoderConfig) -> Result<Self> {
        let args = config.build_args();

        let mut child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::TranscoderSpawn {
                program: config.program.clone(),
                source,
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "transcoder stdout missing"))
        })?;

        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let program = config.program.clone();

        tokio::spawn(async move {
            let state = match child.wait().await {
                Ok(status) => {
                    tracing::debug!(program = %program, status = %status, "Transcoder exited");
                    ProcessState::Exited(status.code())
                }
                Err(e) => {
                    tracing::warn!(program = %program, error = %e, "Failed to wait for transcoder");
                    ProcessState::Exited(None)
                }
            };
            state_tx.send_replace(state);
        });

        tracing::info!(
            program = %config.program,
            pid = ?pid,
            args = ?args,
            "Spawned transcoder"
        );

        Ok(Self {
            program: config.program.clone(),
            pid,
            input: Mutex::new(stdin),
            output: Some(TranscoderOutput {
                stdout,
                state: state_rx.clone(),
                buf: [0u8; CHUNK_SIZE],
            }),
            state: state_rx,
        })
    }

    /// OS process ID, if the process was still running when spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Hand out the encoded output stream
    ///
    /// Returns `None` after the first call.
    pub fn take_output(&mut self) -> Option<TranscoderOutput> {
        self.output.take()
    }

    /// Write one raw frame to the transcoder input
    ///
    /// Fails with [`Error::PipeClosed`] once the input was closed by
    /// [`flush`](Self::flush) or the process stopped reading.
    pub async fn write(&self, frame: &[u8]) -> Result<()> {
        let mut input = self.input.lock().await;
        let stdin = input.as_mut().ok_or(Error::PipeClosed)?;

        match stdin.write_all(frame).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                *input = None;
                Err(Error::PipeClosed)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Current process state
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Close the input and wait for the process to exit
    ///
    /// The wait is unbounded: a transcoder that never exits blocks here.
    /// Calling this again returns the recorded exit state.
    pub async fn flush(&self) -> ProcessState {
        if self.input.lock().await.take().is_some() {
            tracing::info!(program = %self.program, pid = ?self.pid(), "Waiting for transcoder to exit");
        }

        wait_exited(self.state.clone()).await
    }
}

/// Encoded output side of the transcoder
pub struct TranscoderOutput {
    stdout: ChildStdout,
    state: watch::Receiver<ProcessState>,
    buf: [u8; CHUNK_SIZE],
}

impl TranscoderOutput {
    /// Read the next chunk of encoded output (at most [`CHUNK_SIZE`] bytes)
    ///
    /// Waits until data is available. An empty chunk means end of stream.
    pub async fn read_chunk(&mut self) -> io::Result<Bytes> {
        let n = self.stdout.read(&mut self.buf).await?;
        Ok(Bytes::copy_from_slice(&self.buf[..n]))
    }

    /// Check whether the process has exited, without waiting
    pub fn has_exited(&self) -> bool {
        matches!(*self.state.borrow(), ProcessState::Exited(_))
    }

    /// Wait until the process has exited
    pub async fn wait_exited(&self) -> ProcessState {
        wait_exited(self.state.clone()).await
    }
}

async fn wait_exited(mut state: watch::Receiver<ProcessState>) -> ProcessState {
    match state.wait_for(|s| matches!(s, ProcessState::Exited(_))).await {
        Ok(s) => *s,
        // Reaper is gone without publishing; nothing left to wait for
        Err(_) => ProcessState::Exited(None),
    }
}
