//! Transcoder invocation

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use url::Url;

/// How to launch the MJPEG transcoder
///
/// The output contract is a bare concatenation of JPEG images on stdout,
/// each scaled to `width`x`height`, at `fps` frames per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderCommand {
    /// Executable (ffmpeg or compatible)
    pub program: PathBuf,
    /// Upstream URL
    pub source: String,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Output frame rate
    pub fps: u32,
    /// JPEG quality (`-q:v`, 1 best to 31 worst)
    pub quality: u8,
}

impl TranscoderCommand {
    /// Default invocation for `source`
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            source: source.into(),
            width: 1280,
            height: 720,
            fps: 15,
            quality: 5,
        }
    }

    /// Set the executable
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the output size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the output frame rate
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the JPEG quality
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Source URL with any credentials removed, for logging
    pub fn redacted_source(&self) -> String {
        match Url::parse(&self.source) {
            Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
                let _ = url.set_username("");
                let _ = url.set_password(None);
                url.to_string()
            }
            _ => self.source.clone(),
        }
    }

    /// RTSP sources are pulled over TCP
    fn is_rtsp(&self) -> bool {
        let lower = self.source.to_ascii_lowercase();
        lower.starts_with("rtsp://") || lower.starts_with("rtsps://")
    }

    /// Arguments after the program name
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-nostdin".into(), "-loglevel".into(), "error".into()];

        if self.is_rtsp() {
            args.extend(["-rtsp_transport".into(), "tcp".into()]);
        }

        args.extend([
            "-i".into(),
            self.source.clone().into(),
            "-an".into(),
            "-f".into(),
            "image2pipe".into(),
            "-c:v".into(),
            "mjpeg".into(),
            "-vf".into(),
            format!("scale={}:{}", self.width, self.height).into(),
            "-r".into(),
            self.fps.to_string().into(),
            "-q:v".into(),
            self.quality.to_string().into(),
            "pipe:1".into(),
        ]);

        args
    }

    /// Build the process command
    ///
    /// stdin is closed, stdout and stderr are piped, and the child is killed
    /// when its handle is dropped.
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}
