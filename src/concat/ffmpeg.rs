//! ffmpeg-based concatenation using the external ffmpeg binary

use super::{ConcatCapabilities, Concatenator};
use crate::config::ToolsConfig;
use crate::error::{ConcatError, Error, Result};
use crate::types::ConcatStrategy;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Suffix of the concat-demuxer list written next to the output
pub const CONCAT_LIST_SUFFIX: &str = ".concat.txt";

/// Lines of stderr kept in [`ConcatError::ToolFailed`]
const STDERR_TAIL_LINES: usize = 8;

/// Common audio format every re-encode input is converted to
const AUDIO_FORMAT: &str = "aresample=48000,aformat=sample_fmts=fltp:channel_layouts=stereo";

/// What `ffmpeg -i` reports about one input
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct StreamInfo {
    has_audio: bool,
    duration_secs: Option<f64>,
}

/// Audio feeding one segment of the re-encode concat
#[derive(Clone, Copy, Debug, PartialEq)]
enum AudioSource {
    /// The input's own first audio stream
    Track,
    /// Generated silence matching the input's length
    Silence { secs: f64 },
}

/// Concatenator that drives the external `ffmpeg` binary
///
/// Fast concatenation uses the concat demuxer with stream copy. Re-encoding
/// uses the concat filter, scaling every input onto a common frame first.
/// Inputs without audio get silence of their own length; when no input has
/// audio, or a silent input's length is unknown, the output is video only.
///
/// # Examples
///
/// ```no_run
/// use filler_dl::concat::{Concatenator, FfmpegConcatenator};
/// use std::path::{Path, PathBuf};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ffmpeg = FfmpegConcatenator::from_path().ok_or("ffmpeg not found in PATH")?;
/// let inputs = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];
/// ffmpeg.fast_concat(&inputs, Path::new("joined.mp4")).await?;
/// # Ok(())
/// # }
/// ```
pub struct FfmpegConcatenator {
    binary_path: PathBuf,
    frame_width: u32,
    frame_height: u32,
}

impl FfmpegConcatenator {
    /// Create a concatenator with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            frame_width: 1920,
            frame_height: 1080,
        }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Resolve the binary from tool configuration, falling back to PATH when allowed
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        match &tools.ffmpeg_path {
            Some(path) => Some(Self::new(path.clone())),
            None if tools.search_path => Self::from_path(),
            None => None,
        }
    }

    /// Frame size every input is scaled and padded to when re-encoding
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    async fn run(&self, strategy: ConcatStrategy, command: &mut Command) -> Result<()> {
        let output = command
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ConcatError::ToolFailed {
            strategy: strategy.as_str(),
            code: output.status.code(),
            stderr: stderr_tail(&stderr),
        }
        .into())
    }

    /// Read stream layout and duration from `ffmpeg -i`
    ///
    /// ffmpeg exits non-zero without an output file; only stderr matters. A
    /// probe that cannot run reports no audio and no duration.
    async fn probe(&self, input: &Path) -> StreamInfo {
        let mut command = Command::new(&self.binary_path);
        command
            .args(["-hide_banner", "-nostdin", "-i"])
            .arg(input)
            .kill_on_drop(true);
        match command.output().await {
            Ok(output) => parse_stream_info(&String::from_utf8_lossy(&output.stderr)),
            Err(e) => {
                tracing::debug!(?input, error = %e, "ffmpeg probe failed");
                StreamInfo::default()
            }
        }
    }

    fn reencode_filter(&self, inputs: usize, audio: Option<&[AudioSource]>) -> String {
        let (w, h) = (self.frame_width, self.frame_height);
        let mut filter = String::new();
        for i in 0..inputs {
            let _ = write!(
                filter,
                "[{i}:v:0]scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps=30[v{i}];"
            );
        }
        let Some(audio) = audio else {
            for i in 0..inputs {
                let _ = write!(filter, "[v{i}]");
            }
            let _ = write!(filter, "concat=n={inputs}:v=1:a=0[v]");
            return filter;
        };
        for (i, source) in audio.iter().enumerate() {
            let _ = match source {
                AudioSource::Track => write!(filter, "[{i}:a:0]{AUDIO_FORMAT}[a{i}];"),
                AudioSource::Silence { secs } => write!(
                    filter,
                    "anullsrc=r=48000:cl=stereo,atrim=duration={secs:.3},{AUDIO_FORMAT}[a{i}];"
                ),
            };
        }
        for i in 0..inputs {
            let _ = write!(filter, "[v{i}][a{i}]");
        }
        let _ = write!(filter, "concat=n={inputs}:v=1:a=1[v][a]");
        filter
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn fast_concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let list_path = list_path_for(output);
        tokio::fs::write(&list_path, concat_list(inputs)?).await?;

        let mut command = Command::new(&self.binary_path);
        command
            .args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output);
        let result = self.run(ConcatStrategy::FastConcat, &mut command).await;

        crate::utils::remove_file_logged(&list_path).await;
        result
    }

    async fn reencode_concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut streams = Vec::with_capacity(inputs.len());
        for input in inputs {
            streams.push(self.probe(input).await);
        }
        let audio = audio_plan(&streams);
        if audio.is_none() {
            tracing::debug!(inputs = inputs.len(), "re-encoding without audio");
        }

        let mut command = Command::new(&self.binary_path);
        command.args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]);
        for input in inputs {
            command.arg("-i").arg(input);
        }
        command
            .arg("-filter_complex")
            .arg(self.reencode_filter(inputs.len(), audio.as_deref()))
            .args(["-map", "[v]"])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "23"]);
        if audio.is_some() {
            command.args(["-map", "[a]", "-c:a", "aac", "-b:a", "160k"]);
        }
        command.args(["-movflags", "+faststart"]).arg(output);

        self.run(ConcatStrategy::ReencodeConcat, &mut command).await
    }

    fn capabilities(&self) -> ConcatCapabilities {
        ConcatCapabilities {
            can_fast_concat: true,
            can_reencode: true,
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Location of the concat list for an output file
fn list_path_for(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(CONCAT_LIST_SUFFIX);
    output.with_file_name(name)
}

/// Render a concat-demuxer list file
///
/// Paths are made absolute so the list resolves independently of its own
/// location; single quotes are escaped the way the demuxer expects.
fn concat_list(inputs: &[PathBuf]) -> Result<String> {
    let mut list = String::new();
    for input in inputs {
        let absolute = std::path::absolute(input)?;
        let escaped = absolute.to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(list, "file '{escaped}'");
    }
    Ok(list)
}

/// Pick the audio for each segment, or `None` for a video-only output
fn audio_plan(streams: &[StreamInfo]) -> Option<Vec<AudioSource>> {
    if !streams.iter().any(|s| s.has_audio) {
        return None;
    }
    streams
        .iter()
        .map(|s| match (s.has_audio, s.duration_secs) {
            (true, _) => Some(AudioSource::Track),
            (false, Some(secs)) => Some(AudioSource::Silence { secs }),
            (false, None) => None,
        })
        .collect()
}

/// Parse the input banner ffmpeg prints for `-i`
fn parse_stream_info(stderr: &str) -> StreamInfo {
    let has_audio = stderr
        .lines()
        .any(|l| l.trim_start().starts_with("Stream #") && l.contains(": Audio:"));
    let duration_secs = stderr.lines().find_map(|l| {
        let rest = l.trim_start().strip_prefix("Duration:")?;
        let stamp = rest.split(',').next()?.trim();
        let mut parts = stamp.split(':').map(|p| p.parse::<f64>().ok());
        let (h, m, sec) = (parts.next()??, parts.next()??, parts.next()??);
        Some(h * 3600.0 + m * 60.0 + sec)
    });
    StreamInfo {
        has_audio,
        duration_secs,
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
