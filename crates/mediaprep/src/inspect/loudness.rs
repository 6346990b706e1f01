//! Loudness detection for audio streams.
//!
//! Uploads regularly carry an audio track that is pure silence (screen
//! recordings, muxing artifacts). Those must not be tagged as having
//! audio, so stream presence alone is not enough — a volumedetect pass
//! decides.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use regex::Regex;

use super::exec;
use crate::error::InspectError;

/// Below this, on both mean and max volume, a track counts as silent.
/// volumedetect floors around -91 dB for digital silence.
pub const SILENCE_THRESHOLD_DB: f64 = -60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loudness {
    pub mean_db: f64,
    pub max_db: f64,
}

impl Loudness {
    pub fn is_audible(&self) -> bool {
        self.mean_db > SILENCE_THRESHOLD_DB || self.max_db > SILENCE_THRESHOLD_DB
    }
}

/// Runs a volumedetect pass over the file's audio and reports the
/// measured loudness, or `None` if ffmpeg printed no measurement (no
/// decodable audio samples).
pub fn detect(ffmpeg: &Path, file: &Path, timeout: Duration) -> Result<Option<Loudness>, InspectError> {
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner")
        .arg("-i")
        .arg(file)
        .args(["-vn", "-af", "volumedetect", "-f", "null", "-"]);

    let output = exec::run_tool_checked(&mut cmd, "ffmpeg", timeout)?;
    Ok(parse_volumedetect(&output.stderr_lossy()))
}

/// Scrapes `mean_volume` and `max_volume` out of volumedetect's stderr
/// report.
pub fn parse_volumedetect(stderr: &str) -> Option<Loudness> {
    let mean_re = Regex::new(r"mean_volume:\s*(-?[0-9]+(?:\.[0-9]+)?) dB").expect("valid regex");
    let max_re = Regex::new(r"max_volume:\s*(-?[0-9]+(?:\.[0-9]+)?) dB").expect("valid regex");

    let capture = |re: &Regex| {
        re.captures(stderr)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    let mean_db = capture(&mean_re)?;
    let max_db = capture(&max_re)?;
    Some(Loudness { mean_db, max_db })
}
