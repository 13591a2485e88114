//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::media::{CaptureConfig, TranscoderConfig};
use crate::registry::RegistryConfig;

/// Default capture width
pub const DEFAULT_WIDTH: u16 = 320;

/// Default capture height
pub const DEFAULT_HEIGHT: u16 = 240;

/// Default capture frame rate
pub const DEFAULT_FRAMERATE: u32 = 24;

/// Default port of the HTTP content server
pub const DEFAULT_HTTP_PORT: u16 = 8082;

/// Default port of the streaming websocket server
pub const DEFAULT_STREAM_PORT: u16 = 8084;

/// Default port of the control websocket server
pub const DEFAULT_CONTROL_PORT: u16 = 3000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address all three listeners bind to
    pub bind_ip: IpAddr,

    /// HTTP content server port
    pub http_port: u16,

    /// Streaming websocket port
    pub stream_port: u16,

    /// Control websocket port
    pub control_port: u16,

    /// Capture width in pixels
    pub width: u16,

    /// Capture height in pixels
    pub height: u16,

    /// Capture frame rate
    pub framerate: u32,

    /// Camera warm-up time after the device is opened
    pub warmup: Duration,

    /// How often the supervisor checks on the capture session
    pub poll_interval: Duration,

    /// Directory holding `index.html` and `jsmpg.js`
    pub assets_dir: PathBuf,

    /// Transcoder program, bitrate and optional argument override
    ///
    /// Frame geometry is taken from this config, not from here.
    pub transcoder: TranscoderConfig,

    /// Per-client queueing
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: DEFAULT_HTTP_PORT,
            stream_port: DEFAULT_STREAM_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            framerate: DEFAULT_FRAMERATE,
            warmup: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            assets_dir: PathBuf::from("."),
            transcoder: TranscoderConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the bind address for all listeners
    pub fn bind(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the three listener ports (0 picks a free port)
    pub fn ports(mut self, http: u16, stream: u16, control: u16) -> Self {
        self.http_port = http;
        self.stream_port = stream;
        self.control_port = control;
        self
    }

    /// Set capture resolution
    pub fn resolution(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set capture frame rate (minimum 1)
    pub fn framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate.max(1);
        self
    }

    /// Set camera warm-up time
    pub fn warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the supervisor poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the static asset directory
    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Set the transcoder launch config
    pub fn transcoder(mut self, transcoder: TranscoderConfig) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Set the client registry config
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.http_port)
    }

    pub fn stream_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.stream_port)
    }

    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.control_port)
    }

    /// Capture settings derived from this config
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            warmup: self.warmup,
        }
    }

    /// Transcoder settings with this config's frame geometry
    pub fn transcoder_config(&self) -> TranscoderConfig {
        TranscoderConfig {
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            ..self.transcoder.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.http_addr().port(), 8082);
        assert_eq!(config.stream_addr().port(), 8084);
        assert_eq!(config.control_addr().port(), 3000);
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.framerate, 24);
        assert_eq!(config.warmup, Duration::from_secs(1));
        assert!(config.bind_ip.is_unspecified());
    }

    #[test]
    fn test_builder_chaining() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let config = ServerConfig::default()
            .bind(ip)
            .ports(0, 0, 0)
            .resolution(640, 480)
            .framerate(30)
            .warmup(Duration::ZERO)
            .poll_interval(Duration::from_millis(50));

        assert_eq!(config.http_addr(), SocketAddr::new(ip, 0));
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.framerate, 30);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_framerate_floor() {
        let config = ServerConfig::default().framerate(0);

        assert_eq!(config.framerate, 1);
    }

    #[test]
    fn test_derived_configs_share_geometry() {
        let config = ServerConfig::default()
            .resolution(640, 480)
            .framerate(30)
            .transcoder(TranscoderConfig::default().bitrate("1200k"));

        let capture = config.capture_config();
        assert_eq!(capture.frame_size(), 640 * 480 * 3 / 2);

        let transcoder = config.transcoder_config();
        assert_eq!((transcoder.width, transcoder.height), (640, 480));
        assert_eq!(transcoder.framerate, 30);
        assert_eq!(transcoder.bitrate, "1200k");
    }
}
