//! Command-line, environment and file configuration
//!
//! Every option can be given as a flag, an environment variable or a key in
//! an optional TOML file passed with `--config`:
//!
//! ```toml
//! [log]
//! level = "debug"
//!
//! [server]
//! bind = "0.0.0.0:9999"
//!
//! [camera]
//! source = "rtsp://192.168.1.20:554/stream1"
//! width = 1280
//! height = 720
//! fps = 15
//! ```
//!
//! Flags and environment variables take precedence over the file.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::media::DEFAULT_MAX_PENDING_BYTES;
use crate::server::ServerConfig;
use crate::supervisor::{SupervisorConfig, TranscoderCommand};

/// Upstream URL schemes the transcoder is expected to open
pub const SUPPORTED_SCHEMES: &[&str] = &["rtsp", "rtsps", "rtmp", "http", "https", "tcp", "udp", "srt"];

/// Largest accepted output dimension
pub const MAX_DIMENSION: u32 = 7680;

/// Highest accepted output frame rate
pub const MAX_FPS: u32 = 120;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Bad command line (also carries `--help` and `--version`)
    #[error(transparent)]
    Cli(#[from] clap::Error),

    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// No upstream source configured
    #[error("no camera source configured (use --source or CAMRELAY_SOURCE)")]
    MissingSource,

    /// Upstream URL scheme the transcoder cannot open
    #[error("unsupported source scheme `{0}`")]
    UnsupportedScheme(String),

    /// Output width or height out of range
    #[error("invalid output size {width}x{height} (each side must be 1..=7680)")]
    InvalidSize { width: u32, height: u32 },

    /// Output frame rate out of range
    #[error("invalid frame rate {0} (must be 1..=120)")]
    InvalidFrameRate(u32),

    /// JPEG quality outside the encoder's 1-31 scale
    #[error("invalid quality {0} (must be 1..=31, lower is better)")]
    InvalidQuality(u8),

    /// A size or count that must be positive was zero
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    /// Unknown log level
    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),
}

/// Top-level configuration
#[derive(Parser, Clone, Debug, Default, Deserialize, Serialize)]
#[command(name = "camrelay", version, about = "Relay a camera feed to browser viewers")]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// TOML config file
    #[arg(long, short = 'c', env = "CAMRELAY_CONFIG")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogConfig,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub camera: CameraArgs,
}

/// Logging options
#[derive(Args, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogConfig {
    /// Default log level; `RUST_LOG` directives refine it
    #[arg(long = "log-level", env = "CAMRELAY_LOG_LEVEL", default_value = "info")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Parsed level, falling back to `info`
    pub fn level(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }

    /// Install the global `tracing` subscriber
    ///
    /// Does nothing if a subscriber is already installed.
    pub fn init(&self) {
        let filter = EnvFilter::builder()
            .with_default_directive(self.level().into())
            .from_env_lossy();

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// HTTP/WebSocket listener options
#[derive(Args, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerArgs {
    /// Listen address for /stream, /signal and /health
    #[arg(long, env = "CAMRELAY_BIND", default_value = "0.0.0.0:9999")]
    pub bind: SocketAddr,

    /// Frames queued per viewer before frames are dropped for it
    #[arg(long, env = "CAMRELAY_VIEWER_QUEUE", default_value_t = crate::broadcast::DEFAULT_VIEWER_QUEUE)]
    pub viewer_queue: usize,

    /// Messages queued per signaling peer
    #[arg(long, env = "CAMRELAY_PEER_QUEUE", default_value_t = crate::signaling::DEFAULT_PEER_QUEUE)]
    pub peer_queue: usize,

    /// Seconds between statistics log lines
    #[arg(long, env = "CAMRELAY_STATS_INTERVAL", default_value_t = 30)]
    pub stats_interval: u64,
}

impl Default for ServerArgs {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            bind: server.bind_addr,
            viewer_queue: server.viewer_queue,
            peer_queue: server.peer_queue,
            stats_interval: server.stats_interval.as_secs(),
        }
    }
}

/// Camera and transcoder options
#[derive(Args, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct CameraArgs {
    /// Upstream video URL, e.g. rtsp://camera.local:554/stream1
    #[arg(long, env = "CAMRELAY_SOURCE")]
    pub source: Option<Url>,

    /// Output frame width in pixels
    #[arg(long, env = "CAMRELAY_WIDTH", default_value_t = 1280)]
    pub width: u32,

    /// Output frame height in pixels
    #[arg(long, env = "CAMRELAY_HEIGHT", default_value_t = 720)]
    pub height: u32,

    /// Output frames per second
    #[arg(long, env = "CAMRELAY_FPS", default_value_t = 15)]
    pub fps: u32,

    /// JPEG quality, 1 (best) to 31 (worst)
    #[arg(long, env = "CAMRELAY_QUALITY", default_value_t = 5)]
    pub quality: u8,

    /// Transcoder executable
    #[arg(long, env = "CAMRELAY_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Bytes buffered without a complete frame before restarting
    #[arg(long, env = "CAMRELAY_MAX_PENDING_BYTES", default_value_t = DEFAULT_MAX_PENDING_BYTES)]
    pub max_pending_bytes: usize,

    /// Seconds without output before the transcoder is restarted
    #[arg(long, env = "CAMRELAY_STALL_TIMEOUT", default_value_t = 15)]
    pub stall_timeout: u64,
}

impl Default for CameraArgs {
    fn default() -> Self {
        Self {
            source: None,
            width: 1280,
            height: 720,
            fps: 15,
            quality: 5,
            ffmpeg: PathBuf::from("ffmpeg"),
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            stall_timeout: 15,
        }
    }
}

impl Config {
    /// Load from the process arguments, environment and `--config` file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::args_os())
    }

    /// Load from the given arguments (the first is the program name)
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let cli = Self::from_arg_matches(&matches)?;

        let Some(path) = cli.config.clone() else {
            return Ok(cli);
        };

        let mut config = Self::from_file(&path)?;
        config.config = Some(path);
        config.overlay(&cli, &matches);
        Ok(config)
    }

    /// Read a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Copy values given explicitly on the command line or in the environment
    fn overlay(&mut self, cli: &Self, matches: &ArgMatches) {
        let explicit = |id: &str| {
            matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        macro_rules! overlay {
            ($($section:ident . $field:ident),* $(,)?) => {
                $(
                    if explicit(stringify!($field)) {
                        self.$section.$field = cli.$section.$field.clone();
                    }
                )*
            };
        }

        overlay!(
            log.level,
            server.bind,
            server.viewer_queue,
            server.peer_queue,
            server.stats_interval,
            camera.source,
            camera.width,
            camera.height,
            camera.fps,
            camera.quality,
            camera.ffmpeg,
            camera.max_pending_bytes,
            camera.stall_timeout,
        );
    }

    /// Check every value, failing on the first bad one
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.level.parse::<LevelFilter>().is_err() {
            return Err(ConfigError::InvalidLogLevel(self.log.level.clone()));
        }

        let camera = &self.camera;
        let source = camera.source.as_ref().ok_or(ConfigError::MissingSource)?;
        if !SUPPORTED_SCHEMES.contains(&source.scheme()) {
            return Err(ConfigError::UnsupportedScheme(source.scheme().to_string()));
        }
        if source.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingSource);
        }

        let side_ok = |v: u32| (1..=MAX_DIMENSION).contains(&v);
        if !side_ok(camera.width) || !side_ok(camera.height) {
            return Err(ConfigError::InvalidSize {
                width: camera.width,
                height: camera.height,
            });
        }
        if !(1..=MAX_FPS).contains(&camera.fps) {
            return Err(ConfigError::InvalidFrameRate(camera.fps));
        }
        if !(1..=31).contains(&camera.quality) {
            return Err(ConfigError::InvalidQuality(camera.quality));
        }

        let positive = [
            ("max_pending_bytes", camera.max_pending_bytes as u64),
            ("stall_timeout", camera.stall_timeout),
            ("viewer_queue", self.server.viewer_queue as u64),
            ("peer_queue", self.server.peer_queue as u64),
            ("stats_interval", self.server.stats_interval),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }

        Ok(())
    }

    /// Validate and split into component configs
    pub fn build(&self) -> Result<(ServerConfig, SupervisorConfig), ConfigError> {
        self.validate()?;

        let server = ServerConfig::default()
            .bind(self.server.bind)
            .viewer_queue(self.server.viewer_queue)
            .peer_queue(self.server.peer_queue)
            .stats_interval(Duration::from_secs(self.server.stats_interval));

        let camera = &self.camera;
        let source = camera.source.as_ref().ok_or(ConfigError::MissingSource)?;
        let command = TranscoderCommand::new(source.as_str())
            .program(&camera.ffmpeg)
            .size(camera.width, camera.height)
            .fps(camera.fps)
            .quality(camera.quality);

        let supervisor = SupervisorConfig::new(command)
            .stall_timeout(Duration::from_secs(camera.stall_timeout))
            .max_pending_bytes(camera.max_pending_bytes);

        Ok((server, supervisor))
    }
}
