//! Stream and container probing via ffprobe.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use super::exec;
use crate::error::InspectError;

/// Containers whose declared MIME type forces a probe format hint
/// instead of relying on autodetection, which is unreliable for
/// truncated uploads of these types.
const FORMAT_HINTS: &[(&str, &str)] = &[("video/mp2t", "mpegts"), ("video/mpeg", "mpeg")];

pub fn format_hint(mime: &str) -> Option<&'static str> {
    FORMAT_HINTS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, hint)| *hint)
}

/// Parsed `ffprobe -print_format json` output. Numeric fields arrive as
/// strings and are parsed lazily by the accessors.
#[derive(Debug, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
}

impl ProbeStream {
    pub fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    pub fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.as_deref().and_then(|d| d.parse().ok())
    }
}

impl ProbeOutput {
    /// First video-capable stream. Still images appear to the probe as a
    /// single-frame video stream, so this is the thumbnail source for
    /// every supported media type.
    pub fn first_video(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.is_video())
    }

    pub fn has_audio_stream(&self) -> bool {
        self.streams.iter().any(|s| s.is_audio())
    }

    pub fn container_duration(&self) -> Option<f64> {
        self.format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse().ok())
    }

    pub fn container_size(&self) -> Option<i64> {
        self.format
            .as_ref()
            .and_then(|f| f.size.as_deref())
            .and_then(|s| s.parse().ok())
    }
}

/// Probes `file` for stream and container information.
pub fn probe_file(
    ffprobe: &Path,
    file: &Path,
    mime: &str,
    timeout: Duration,
) -> Result<ProbeOutput, InspectError> {
    let mut cmd = Command::new(ffprobe);
    cmd.args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"]);
    if let Some(hint) = format_hint(mime) {
        cmd.args(["-f", hint]);
    }
    cmd.arg(file);

    let output = exec::run_tool_checked(&mut cmd, "ffprobe", timeout)?;
    parse_probe_output(&output.stdout)
}

pub fn parse_probe_output(json: &[u8]) -> Result<ProbeOutput, InspectError> {
    Ok(serde_json::from_slice(json)?)
}
