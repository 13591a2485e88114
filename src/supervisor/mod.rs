//! Supervisor
//!
//! Owns startup ordering, the running capture, and the one teardown path.
//!
//! # Startup
//!
//! 1. Load static assets
//! 2. Open the frame source and let the camera warm up
//! 3. Spawn the transcoder
//! 4. Bind the stream, content and control listeners
//! 5. Start the broadcast relay
//! 6. Start capture into the transcoder
//!
//! # Teardown
//!
//! Capture stops before the transcoder input is closed, so no frame is ever
//! written to a closed pipe. Then the transcoder is flushed, the listeners
//! are cancelled, the relay is joined, clients are closed and the listener
//! tasks are joined. Teardown runs once, and only touches what was started.

pub mod state;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actuator::{Actuator, AxisState, LogActuator};
use crate::error::{Error, Result};
use crate::media::{
    BroadcastRelay, CaptureSession, FrameSource, RelaySummary, Transcoder, TranscoderOutput,
};
use crate::protocol::StreamHeader;
use crate::registry::ClientRegistry;
use crate::server::{listener, ContentServer, ControlChannel, ServerConfig, StaticContent, StreamServer};
use crate::stats::RelayStats;

pub use state::LifecycleState;

/// Addresses the listeners actually bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub http: SocketAddr,
    pub stream: SocketAddr,
    pub control: SocketAddr,
}

/// Cloneable handle for observing and stopping a supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    shutdown: CancellationToken,
    state: watch::Receiver<LifecycleState>,
    bound: Arc<OnceLock<BoundAddrs>>,
}

impl SupervisorHandle {
    /// Request shutdown
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Shutdown requested");
        }
        self.shutdown.cancel();
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Wait until the supervisor reaches `target` or stops
    ///
    /// Returns the state that ended the wait.
    pub async fn wait_for_state(&self, target: LifecycleState) -> LifecycleState {
        let mut state = self.state.clone();
        if let Ok(reached) = state.wait_for(|s| *s == target || s.is_terminal()).await {
            return *reached;
        }

        // Supervisor dropped without reaching either
        let last = *state.borrow();
        last
    }

    /// Listener addresses, once bound
    pub fn bound_addrs(&self) -> Option<BoundAddrs> {
        self.bound.get().copied()
    }
}

type ListenerTask = (&'static str, JoinHandle<io::Result<()>>);

/// Runs the capture → transcode → broadcast pipeline and the side services
pub struct Supervisor<S: FrameSource> {
    config: ServerConfig,
    content: Option<StaticContent>,
    actuator: Arc<dyn Actuator>,
    axes: Arc<AxisState>,
    registry: Arc<ClientRegistry>,

    state: watch::Sender<LifecycleState>,
    shutdown: CancellationToken,
    listener_shutdown: CancellationToken,
    bound: Arc<OnceLock<BoundAddrs>>,

    // Started resources, taken exactly once during teardown
    source: Option<S>,
    source_opened: bool,
    transcoder: Option<Arc<Transcoder>>,
    output: Option<TranscoderOutput>,
    capture: Option<CaptureSession>,
    relay: Option<JoinHandle<Result<RelaySummary>>>,
    listeners: Vec<ListenerTask>,
}

impl<S: FrameSource> Supervisor<S> {
    /// Create a supervisor for `source`
    ///
    /// Static assets are loaded from `config.assets_dir` at startup unless
    /// provided with [`with_content`](Self::with_content). Without an
    /// actuator, axis moves are only logged.
    pub fn new(config: ServerConfig, source: S) -> Self {
        let header = StreamHeader::new(config.width, config.height);
        let registry = Arc::new(ClientRegistry::with_config(
            header,
            config.registry.clone(),
            Arc::new(RelayStats::new()),
        ));
        let (state, _) = watch::channel(LifecycleState::Idle);

        Self {
            config,
            content: None,
            actuator: Arc::new(LogActuator),
            axes: Arc::new(AxisState::new()),
            registry,
            state,
            shutdown: CancellationToken::new(),
            listener_shutdown: CancellationToken::new(),
            bound: Arc::new(OnceLock::new()),
            source: Some(source),
            source_opened: false,
            transcoder: None,
            output: None,
            capture: None,
            relay: None,
            listeners: Vec::new(),
        }
    }

    /// Drive this actuator on axis moves
    pub fn with_actuator(mut self, actuator: Arc<dyn Actuator>) -> Self {
        self.actuator = actuator;
        self
    }

    /// Serve these assets instead of loading them from disk
    pub fn with_content(mut self, content: StaticContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            shutdown: self.shutdown.clone(),
            state: self.state.subscribe(),
            bound: Arc::clone(&self.bound),
        }
    }

    pub fn axes(&self) -> &Arc<AxisState> {
        &self.axes
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Run until shutdown is requested or a component fails
    ///
    /// Always tears down before returning. Returns the error that ended the
    /// run, if any.
    pub async fn run(mut self) -> Result<()> {
        self.advance(LifecycleState::Initializing);

        let outcome = match self.start().await {
            Ok(()) => {
                self.advance(LifecycleState::Running);
                self.supervise().await
            }
            Err(e) => {
                tracing::error!(error = %e, "Startup failed");
                Err(e)
            }
        };

        self.advance(LifecycleState::Draining);
        self.drain().await;
        self.advance(LifecycleState::Stopped);

        outcome
    }

    fn advance(&self, next: LifecycleState) {
        let current = *self.state.borrow();
        if !current.can_advance_to(next) {
            tracing::warn!(from = %current, to = %next, "Ignoring invalid lifecycle transition");
            return;
        }

        self.state.send_replace(next);
        tracing::debug!(from = %current, to = %next, "Lifecycle transition");
    }

    async fn start(&mut self) -> Result<()> {
        let content = match self.content.take() {
            Some(content) => content,
            None => StaticContent::load(&self.config.assets_dir)?,
        };

        let capture_config = self.config.capture_config();
        tracing::info!(
            width = capture_config.width,
            height = capture_config.height,
            framerate = capture_config.framerate,
            "Initializing camera"
        );
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::CaptureUnavailable("frame source already consumed".into()))?;
        source.open(&capture_config).await?;
        self.source_opened = true;
        tokio::time::sleep(capture_config.warmup).await;

        let mut transcoder = Transcoder::spawn(&self.config.transcoder_config())?;
        self.output = transcoder.take_output();
        let transcoder = Arc::new(transcoder);
        self.transcoder = Some(Arc::clone(&transcoder));

        let stream_listener = listener::bind("stream", self.config.stream_addr()).await?;
        let http_listener = listener::bind("content", self.config.http_addr()).await?;
        let control_listener = listener::bind("control", self.config.control_addr()).await?;

        let bound = BoundAddrs {
            http: http_listener.local_addr()?,
            stream: stream_listener.local_addr()?,
            control: control_listener.local_addr()?,
        };
        let _ = self.bound.set(bound);

        let token = self.listener_shutdown.clone();
        self.spawn_listener(
            "stream",
            StreamServer::new(Arc::clone(&self.registry)).serve(stream_listener, token.clone()),
        );
        self.spawn_listener(
            "content",
            ContentServer::new(content, bound.stream.port()).serve(http_listener, token.clone()),
        );
        self.spawn_listener(
            "control",
            ControlChannel::new(Arc::clone(&self.axes), Arc::clone(&self.actuator))
                .serve(control_listener, token),
        );

        if let Some(output) = self.output.take() {
            self.relay = Some(BroadcastRelay::new(Arc::clone(&self.registry)).spawn(output));
        }

        let source = self
            .source
            .take()
            .ok_or_else(|| Error::CaptureUnavailable("frame source already consumed".into()))?;
        self.capture = Some(CaptureSession::start(source, transcoder));
        tracing::info!("Recording started");

        Ok(())
    }

    fn spawn_listener<F>(&mut self, name: &'static str, serve: F)
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.listeners.push((name, tokio::spawn(serve)));
    }

    async fn supervise(&mut self) -> Result<()> {
        let poll_interval = self.config.poll_interval;

        loop {
            if self.relay.as_ref().is_some_and(|h| h.is_finished()) {
                tracing::error!("Transcoder output ended while running");
                return Err(Error::TranscoderExited);
            }

            if let Some((name, _)) = self.listeners.iter().find(|(_, h)| h.is_finished()) {
                tracing::error!(service = *name, "Listener stopped while running");
                return Err(Error::Io(io::Error::other(format!("{name} listener stopped"))));
            }

            let Some(capture) = self.capture.as_mut() else {
                return Err(Error::CaptureEnded);
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Interrupt received");
                    return Ok(());
                }
                waited = capture.wait(poll_interval) => waited?,
            }
        }
    }

    async fn drain(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            tracing::info!("Stopping recording");
            match capture.stop().await {
                Ok(frames) => tracing::info!(frames = frames, "Recording stopped"),
                Err(e) => tracing::warn!(error = %e, "Capture ended with error"),
            }
        } else if let Some(mut source) = self.source.take() {
            if self.source_opened {
                source.close().await;
            }
        }

        if let Some(transcoder) = self.transcoder.take() {
            // Nobody will read the output if the relay never started
            drop(self.output.take());
            let state = transcoder.flush().await;
            tracing::info!(state = ?state, "Transcoder stopped");
        }

        tracing::info!("Shutting down listeners");
        self.listener_shutdown.cancel();

        if let Some(relay) = self.relay.take() {
            tracing::info!("Waiting for broadcast relay to finish");
            match relay.await {
                Ok(Ok(summary)) => tracing::debug!(chunks = summary.chunks, "Relay joined"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Relay ended with error"),
                Err(e) => tracing::error!(error = %e, "Relay task failed"),
            }
        }

        self.registry.close_all().await;

        for (name, handle) in self.listeners.drain(..) {
            tracing::info!(service = name, "Waiting for listener to finish");
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(service = name, error = %e, "Listener ended with error"),
                Err(e) => tracing::error!(service = name, error = %e, "Listener task failed"),
            }
        }

        let stats = self.registry.stats().snapshot();
        tracing::info!(
            chunks = stats.chunks_relayed,
            bytes = stats.bytes_relayed,
            clients = stats.clients_registered,
            dropped = stats.clients_dropped,
            bitrate = stats.bitrate(),
            "Relay stopped"
        );
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::media::{CaptureConfig, TestPattern, TranscoderConfig};

    fn test_config() -> ServerConfig {
        ServerConfig::default()
            .bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .ports(0, 0, 0)
            .resolution(16, 16)
            .framerate(50)
            .warmup(Duration::ZERO)
            .poll_interval(Duration::from_millis(20))
            .transcoder(TranscoderConfig::default().program("cat").args(Vec::<String>::new()))
    }

    fn content() -> StaticContent {
        StaticContent::new("ws://@ADDRESS@/", "")
    }

    /// Source that fails to open
    struct MissingCamera;

    impl FrameSource for MissingCamera {
        async fn open(&mut self, _config: &CaptureConfig) -> Result<()> {
            Err(Error::CaptureUnavailable("no camera".into()))
        }

        async fn next_frame(&mut self) -> Result<Option<Bytes>> {
            Ok(None)
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_double_shutdown_tears_down_once() {
        let supervisor = Supervisor::new(test_config(), TestPattern::new()).with_content(content());
        let handle = supervisor.handle();
        assert_eq!(handle.state(), LifecycleState::Idle);

        let run = tokio::spawn(supervisor.run());
        assert_eq!(
            handle.wait_for_state(LifecycleState::Running).await,
            LifecycleState::Running
        );
        assert!(handle.bound_addrs().is_some());

        handle.shutdown();
        handle.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handle.state(), LifecycleState::Stopped);

        handle.shutdown();
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_capture_failure_is_fatal() {
        let supervisor = Supervisor::new(test_config(), MissingCamera).with_content(content());
        let handle = supervisor.handle();

        let result = supervisor.run().await;

        assert!(matches!(result, Err(Error::CaptureUnavailable(_))));
        assert_eq!(handle.state(), LifecycleState::Stopped);
        assert!(handle.bound_addrs().is_none());
    }

    #[tokio::test]
    async fn test_missing_transcoder_is_fatal() {
        let config = test_config()
            .transcoder(TranscoderConfig::default().program("/nonexistent/transcoder"));
        let supervisor = Supervisor::new(config, TestPattern::new()).with_content(content());

        let result = supervisor.run().await;

        assert!(matches!(result, Err(Error::TranscoderSpawn { .. })));
    }

    #[tokio::test]
    async fn test_bind_failure_after_transcoder_spawn() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = test_config().ports(0, 0, port);
        let supervisor = Supervisor::new(config, TestPattern::new()).with_content(content());
        let handle = supervisor.handle();

        let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .unwrap();

        assert!(matches!(result, Err(Error::Bind { service: "control", .. })));
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_transcoder_exit_stops_the_run() {
        // Exits immediately: relay ends, capture hits a closed pipe
        let config = test_config()
            .transcoder(TranscoderConfig::default().program("true").args(Vec::<String>::new()));
        let supervisor = Supervisor::new(config, TestPattern::new()).with_content(content());
        let handle = supervisor.handle();

        let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .unwrap();

        assert!(result.is_err());
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }
}
