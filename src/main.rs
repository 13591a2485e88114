use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use camrelay::actuator::{Actuator, LogActuator, PwmDeviceActuator, DEFAULT_X_GPIO, DEFAULT_Y_GPIO};
use camrelay::media::{CommandSource, FrameSource, TestPattern, TranscoderConfig};
use camrelay::server::config::{
    DEFAULT_CONTROL_PORT, DEFAULT_FRAMERATE, DEFAULT_HEIGHT, DEFAULT_HTTP_PORT,
    DEFAULT_STREAM_PORT, DEFAULT_WIDTH,
};
use camrelay::{ServerConfig, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Synthetic gradient, no camera needed
    TestPattern,
    /// Raw frames from an external capture command
    Camera,
}

#[derive(Parser)]
#[clap(version, about = "Relay a camera to browsers as an MPEG-1 websocket stream")]
struct Opt {
    /// Address all listeners bind to
    #[clap(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// HTTP port for the viewer page
    #[clap(long, default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Websocket port for the video stream
    #[clap(long, default_value_t = DEFAULT_STREAM_PORT)]
    stream_port: u16,

    /// Websocket port for pan/tilt control
    #[clap(long, default_value_t = DEFAULT_CONTROL_PORT)]
    control_port: u16,

    #[clap(long, default_value_t = DEFAULT_WIDTH)]
    width: u16,

    #[clap(long, default_value_t = DEFAULT_HEIGHT)]
    height: u16,

    #[clap(long, default_value_t = DEFAULT_FRAMERATE)]
    framerate: u32,

    /// Camera warm-up in milliseconds
    #[clap(long, default_value_t = 1000)]
    warmup_ms: u64,

    /// Directory holding index.html and jsmpg.js
    #[clap(long, default_value = ".")]
    assets_dir: PathBuf,

    /// Transcoder program
    #[clap(long, default_value = "ffmpeg")]
    transcoder: String,

    /// Target video bitrate passed to the transcoder
    #[clap(long, default_value = "800k")]
    bitrate: String,

    /// Frame source
    #[clap(long, value_enum, default_value_t = Source::Camera)]
    source: Source,

    /// Capture program for `--source camera`
    #[clap(long, default_value = "rpicam-vid")]
    camera_command: String,

    /// PWM device file for the servos; moves are only logged without it
    #[clap(long)]
    servo_device: Option<PathBuf>,

    #[clap(long, default_value_t = DEFAULT_X_GPIO)]
    x_gpio: u8,

    #[clap(long, default_value_t = DEFAULT_Y_GPIO)]
    y_gpio: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camrelay=info".parse()?),
        )
        .init();

    let config = ServerConfig::default()
        .bind(opt.bind)
        .ports(opt.http_port, opt.stream_port, opt.control_port)
        .resolution(opt.width, opt.height)
        .framerate(opt.framerate)
        .warmup(Duration::from_millis(opt.warmup_ms))
        .assets_dir(opt.assets_dir.clone())
        .transcoder(
            TranscoderConfig::default()
                .program(opt.transcoder.clone())
                .bitrate(opt.bitrate.clone()),
        );

    let actuator: Arc<dyn Actuator> = match opt.servo_device {
        Some(ref path) => Arc::new(PwmDeviceActuator::new(path).pins(opt.x_gpio, opt.y_gpio)),
        None => Arc::new(LogActuator),
    };

    match opt.source {
        Source::TestPattern => run(config, TestPattern::new(), actuator).await,
        Source::Camera => run(config, CommandSource::new(opt.camera_command), actuator).await,
    }
}

async fn run<S: FrameSource>(
    config: ServerConfig,
    source: S,
    actuator: Arc<dyn Actuator>,
) -> anyhow::Result<()> {
    tracing::info!(
        http = %config.http_addr(),
        stream = %config.stream_addr(),
        control = %config.control_addr(),
        "Starting camera relay"
    );

    let supervisor = Supervisor::new(config, source).with_actuator(actuator);
    let handle = supervisor.handle();

    tokio::spawn(async move {
        // Repeated interrupts are harmless
        while tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    supervisor.run().await?;
    tracing::info!("Exited cleanly");
    Ok(())
}
