//! Media inspection: probe a file, measure loudness, render a thumbnail,
//! derive tags.
//!
//! The inspector is deliberately naive about prior state: it assumes no
//! partial run left anything valid behind, overwrites the thumbnail
//! unconditionally, and produces the same result when invoked repeatedly
//! on the same input (modulo the external tools themselves).

pub mod exec;
pub mod loudness;
pub mod probe;
pub mod thumbnail;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info_span, warn};

use crate::classify;
use crate::config::Settings;
use crate::db::media_repo::{MediaDescriptor, MediaMeta};

/// Outcome of inspecting one media file. `meta` is present if and only
/// if `success` is true.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectionOutcome {
    pub success: bool,
    /// Failure reason; empty on success.
    pub message: String,
    pub meta: Option<MediaMeta>,
    pub tags: Vec<String>,
}

impl InspectionOutcome {
    pub fn success(meta: MediaMeta, tags: Vec<String>) -> Self {
        Self {
            success: true,
            message: String::new(),
            meta: Some(meta),
            tags,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            meta: None,
            tags: vec![],
        }
    }
}

/// The seam between the worker loop and the actual file inspection.
/// Production uses [`MediaInspector`]; tests substitute stubs.
pub trait Inspector: Send + Sync {
    fn inspect(&self, descriptor: &MediaDescriptor) -> InspectionOutcome;
}

/// Inspects media files by driving ffprobe and ffmpeg.
pub struct MediaInspector {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
    thumbnail_bound: u32,
    tool_timeout: Duration,
}

impl MediaInspector {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ffprobe: settings.ffprobe_path.clone(),
            ffmpeg: settings.ffmpeg_path.clone(),
            thumbnail_bound: settings.thumbnail_bound,
            tool_timeout: Duration::from_secs(settings.tool_timeout_secs),
        }
    }
}

impl Inspector for MediaInspector {
    fn inspect(&self, descriptor: &MediaDescriptor) -> InspectionOutcome {
        let _span = info_span!("inspect",
            media = %descriptor.storage_id,
            mime = %descriptor.mime,
        )
        .entered();

        let full_path = Path::new(&descriptor.full_path);

        let probe = {
            let _step = info_span!("probe").entered();
            match probe::probe_file(&self.ffprobe, full_path, &descriptor.mime, self.tool_timeout) {
                Ok(probe) => probe,
                Err(e) => return InspectionOutcome::failure(e.to_string()),
            }
        };

        if probe.streams.is_empty() {
            return InspectionOutcome::failure("no streams");
        }
        // Still images are a single-frame video stream to the probe, so
        // no video-capable stream means no thumbnail source at all.
        let Some(video) = probe.first_video() else {
            return InspectionOutcome::failure("no video streams");
        };

        let is_video = descriptor.mime.starts_with("video/");
        let duration = if is_video {
            video
                .duration_secs()
                .or_else(|| probe.container_duration())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let byte_size = probe
            .container_size()
            .or_else(|| std::fs::metadata(full_path).ok().map(|m| m.len() as i64))
            .unwrap_or(0);

        let has_audio = if probe.has_audio_stream() {
            let _step = info_span!("loudness").entered();
            match loudness::detect(&self.ffmpeg, full_path, self.tool_timeout) {
                Ok(Some(measured)) => measured.is_audible(),
                Ok(None) => false,
                Err(e) => {
                    warn!("Loudness pass failed for {}: {}", descriptor.storage_id, e);
                    false
                }
            }
        } else {
            false
        };

        {
            let _step = info_span!("thumbnail").entered();
            let seek_secs = if is_video { duration / 8.0 } else { 0.0 };
            if let Err(e) = thumbnail::generate(
                &self.ffmpeg,
                full_path,
                Path::new(&descriptor.thumb_path),
                seek_secs,
                self.thumbnail_bound,
                self.tool_timeout,
            ) {
                warn!("Thumbnail failed for {}: {}", descriptor.storage_id, e);
                return InspectionOutcome::failure("thumbnail generation failed");
            }
        }

        let meta = MediaMeta {
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
            is_video,
            duration,
            has_audio,
            byte_size,
        };
        let tags = classify::derive_tags(&meta);
        InspectionOutcome::success(meta, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let meta = MediaMeta {
            width: 640,
            height: 480,
            is_video: false,
            duration: 0.0,
            has_audio: false,
            byte_size: 1000,
        };
        let ok = InspectionOutcome::success(meta, vec!["tiny".to_string()]);
        assert!(ok.success);
        assert!(ok.meta.is_some());
        assert!(ok.message.is_empty());

        let failed = InspectionOutcome::failure("no streams");
        assert!(!failed.success);
        assert!(failed.meta.is_none());
        assert_eq!(failed.message, "no streams");
        assert!(failed.tags.is_empty());
    }
}
