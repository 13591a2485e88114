//! Control websocket
//!
//! Clients send the text commands `top`, `right`, `left` and `bottom`. Each
//! recognized command steps one axis by ±10 if it is inside its bounds and
//! drives the actuator. Every text message, recognized or not, is answered
//! with `"<message> OK"`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::actuator::{Actuator, AxisState};
use crate::protocol::Command;

use super::listener::{serve_router, ServingAddr};

/// Path the control websocket is served on
pub const CONTROL_PATH: &str = "/ws";

/// Suffix appended to every reply
pub const REPLY_SUFFIX: &str = " OK";

/// Command handling shared by all control connections
#[derive(Clone)]
pub struct ControlChannel {
    axes: Arc<AxisState>,
    actuator: Arc<dyn Actuator>,
}

impl ControlChannel {
    pub fn new(axes: Arc<AxisState>, actuator: Arc<dyn Actuator>) -> Self {
        Self { axes, actuator }
    }

    pub fn axes(&self) -> &Arc<AxisState> {
        &self.axes
    }

    /// Apply one message and build its reply
    pub fn handle_message(&self, message: &str) -> String {
        match message.parse::<Command>() {
            Ok(command) => self.apply(command),
            Err(_) => tracing::debug!(message = message, "Ignoring unknown command"),
        }

        format!("{message}{REPLY_SUFFIX}")
    }

    fn apply(&self, command: Command) {
        let axis = command.axis();

        // Drive under the axis lock so the device sees moves in update order
        let moved = self.axes.adjust_with(axis, command.delta(), |value| {
            if let Err(e) = self.actuator.drive(axis, value) {
                tracing::warn!(axis = %axis, value = value, error = %e, "Actuator drive failed");
            }
        });

        let Some(value) = moved else {
            tracing::debug!(
                command = command.as_str(),
                axis = %axis,
                value = self.axes.value(axis),
                "Axis at bound, command ignored"
            );
            return;
        };

        tracing::info!(command = command.as_str(), axis = %axis, value = value, "Axis moved");
    }

    /// Apply one message on the blocking pool
    ///
    /// Actuator drivers may block on device I/O while holding the axis lock,
    /// so connections never run [`handle_message`](Self::handle_message) on a
    /// runtime worker.
    pub async fn dispatch(&self, message: String) -> String {
        let fallback = format!("{message}{REPLY_SUFFIX}");
        let channel = self.clone();

        match tokio::task::spawn_blocking(move || channel.handle_message(&message)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Control command task failed");
                fallback
            }
        }
    }

    /// Router serving the control websocket at [`CONTROL_PATH`]
    ///
    /// Open connections end when `shutdown` is cancelled.
    pub fn router(&self, shutdown: CancellationToken) -> Router {
        Router::new()
            .route(CONTROL_PATH, get(control_upgrade))
            .with_state(ControlState {
                channel: self.clone(),
                shutdown,
            })
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        let router = self.router(shutdown.clone());
        serve_router("control", listener, router, shutdown).await
    }
}

#[derive(Clone)]
struct ControlState {
    channel: ControlChannel,
    shutdown: CancellationToken,
}

async fn control_upgrade(
    State(state): State<ControlState>,
    ConnectInfo(addr): ConnectInfo<ServingAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state, addr.peer))
}

async fn serve_connection(mut socket: WebSocket, state: ControlState, peer: SocketAddr) {
    tracing::info!(peer = %peer, "Control client connected");

    loop {
        let msg = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = socket.recv() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let reply = state.channel.dispatch(text.as_str().to_owned()).await;
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(peer = %peer, error = %e, "Control connection read failed");
                break;
            }
        }
    }

    tracing::info!(peer = %peer, "Control connection closed");
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::protocol::Axis;

    #[derive(Default)]
    struct RecordingActuator {
        moves: Mutex<Vec<(Axis, i32)>>,
    }

    impl Actuator for RecordingActuator {
        fn drive(&self, axis: Axis, value: i32) -> io::Result<()> {
            self.moves.lock().unwrap().push((axis, value));
            Ok(())
        }
    }

    struct BrokenActuator;

    impl Actuator for BrokenActuator {
        fn drive(&self, _axis: Axis, _value: i32) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no servo"))
        }
    }

    fn channel() -> (ControlChannel, Arc<RecordingActuator>) {
        let actuator = Arc::new(RecordingActuator::default());
        let channel = ControlChannel::new(Arc::new(AxisState::new()), actuator.clone());
        (channel, actuator)
    }

    #[test]
    fn test_each_command_moves_its_axis() {
        let (channel, actuator) = channel();

        assert_eq!(channel.handle_message("top"), "top OK");
        assert_eq!(channel.handle_message("right"), "right OK");
        assert_eq!(channel.handle_message("left"), "left OK");
        assert_eq!(channel.handle_message("bottom"), "bottom OK");

        assert_eq!(
            *actuator.moves.lock().unwrap(),
            vec![(Axis::Y, 510), (Axis::X, 510), (Axis::X, 500), (Axis::Y, 500)]
        );
    }

    #[test]
    fn test_top_twenty_one_times() {
        let (channel, actuator) = channel();

        for _ in 0..21 {
            assert_eq!(channel.handle_message("top"), "top OK");
        }

        assert_eq!(channel.axes().value(Axis::Y), 700);
        let moves = actuator.moves.lock().unwrap();
        assert_eq!(moves.len(), 20);
        assert_eq!(moves.last(), Some(&(Axis::Y, 700)));
    }

    #[test]
    fn test_unknown_message_echoed_without_effect() {
        let (channel, actuator) = channel();

        assert_eq!(channel.handle_message("foo"), "foo OK");
        assert_eq!(channel.handle_message("Top"), "Top OK");
        assert_eq!(channel.handle_message(""), " OK");

        assert_eq!(channel.axes().value(Axis::X), 500);
        assert_eq!(channel.axes().value(Axis::Y), 500);
        assert!(actuator.moves.lock().unwrap().is_empty());
    }

    #[test]
    fn test_actuator_failure_still_replies() {
        let channel = ControlChannel::new(Arc::new(AxisState::new()), Arc::new(BrokenActuator));

        assert_eq!(channel.handle_message("right"), "right OK");
        assert_eq!(channel.axes().value(Axis::X), 510);
    }

    /// Blocks its first drive until released
    struct GatedActuator {
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
        moves: Mutex<Vec<i32>>,
    }

    impl Actuator for GatedActuator {
        fn drive(&self, _axis: Axis, value: i32) -> io::Result<()> {
            let gate = self.gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.moves.lock().unwrap().push(value);
            Ok(())
        }
    }

    #[test]
    fn test_slow_drive_keeps_moves_in_update_order() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let actuator = Arc::new(GatedActuator {
            gate: Mutex::new(Some((entered_tx, release_rx))),
            moves: Mutex::new(Vec::new()),
        });
        let channel = ControlChannel::new(Arc::new(AxisState::new()), actuator.clone());

        let first = {
            let channel = channel.clone();
            std::thread::spawn(move || channel.handle_message("top"))
        };
        entered_rx.recv().unwrap();

        let second = {
            let channel = channel.clone();
            std::thread::spawn(move || channel.handle_message("top"))
        };
        std::thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert_eq!(first.join().unwrap(), "top OK");
        assert_eq!(second.join().unwrap(), "top OK");

        let moves = actuator.moves.lock().unwrap();
        assert_eq!(*moves, vec![510, 520]);
        assert_eq!(moves.last(), Some(&channel.axes().value(Axis::Y)));
    }

    /// Drive succeeds only if the runtime keeps running while it blocks
    struct WaitsForRuntime {
        signal: Mutex<mpsc::Receiver<()>>,
    }

    impl Actuator for WaitsForRuntime {
        fn drive(&self, _axis: Axis, _value: i32) -> io::Result<()> {
            self.signal
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(2))
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "runtime blocked"))
        }
    }

    #[tokio::test]
    async fn test_dispatch_keeps_runtime_free() {
        let (tx, rx) = mpsc::channel();
        let actuator = Arc::new(WaitsForRuntime {
            signal: Mutex::new(rx),
        });
        let channel = ControlChannel::new(Arc::new(AxisState::new()), actuator);

        let signaller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });

        let started = std::time::Instant::now();
        assert_eq!(channel.dispatch("bottom".to_string()).await, "bottom OK");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(channel.axes().value(Axis::Y), 490);
        signaller.await.unwrap();
    }

    #[test]
    fn test_concurrent_commands_are_not_lost() {
        let (channel, _actuator) = channel();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let channel = channel.clone();
                std::thread::spawn(move || {
                    channel.handle_message("left");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.axes().value(Axis::X), 400);
    }
}
