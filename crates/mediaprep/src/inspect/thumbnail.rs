//! Single-frame thumbnail rendering via ffmpeg.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use super::exec;
use crate::error::InspectError;

/// Renders exactly one frame of `src` into `dest`, seeking to
/// `seek_secs` first and scaling so neither dimension exceeds
/// `max_dim` (never upscaling). Any pre-existing file at `dest` is
/// overwritten, so the call is safe to repeat after a crash or an
/// explicit reprocess.
pub fn generate(
    ffmpeg: &Path,
    src: &Path,
    dest: &Path,
    seek_secs: f64,
    max_dim: u32,
    timeout: Duration,
) -> Result<(), InspectError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| InspectError::ToolSpawn {
            tool: "ffmpeg",
            source: e,
        })?;
    }

    let scale = format!(
        "scale='min({max_dim},iw)':'min({max_dim},ih)':force_original_aspect_ratio=decrease"
    );

    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-y"]);
    if seek_secs > 0.0 {
        cmd.args(["-ss", &format!("{seek_secs:.3}")]);
    }
    cmd.arg("-i")
        .arg(src)
        .args(["-frames:v", "1", "-vf", &scale])
        .arg(dest);

    exec::run_tool_checked(&mut cmd, "ffmpeg", timeout)?;

    if !dest.exists() {
        return Err(InspectError::ThumbnailMissing(dest.to_path_buf()));
    }
    Ok(())
}
