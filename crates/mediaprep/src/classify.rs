//! Classification tables — pure threshold lookups that turn a numeric
//! measurement into a named bucket, used to derive automated tags.
//!
//! Each table is an ordered list of `{name, upper_bound}` pairs; the
//! first bucket whose bound is not exceeded wins and the last bucket is
//! the unbounded catch-all. Bucket names are unique across all three
//! tables so the bare names double as tag strings.

use crate::db::media_repo::MediaMeta;

/// A named range ending at `upper_bound` (inclusive).
#[derive(Debug, Clone, Copy)]
pub struct Bucket {
    pub name: &'static str,
    pub upper_bound: u64,
}

/// File size buckets, in bytes.
pub const SIZE_BUCKETS: &[Bucket] = &[
    Bucket { name: "tiny", upper_bound: 524_288 },
    Bucket { name: "small", upper_bound: 5_242_880 },
    Bucket { name: "medium", upper_bound: 15_728_640 },
    Bucket { name: "large", upper_bound: 31_457_280 },
    Bucket { name: "massive", upper_bound: u64::MAX },
];

/// Pixel-area buckets (width × height).
pub const AREA_BUCKETS: &[Bucket] = &[
    Bucket { name: "icon", upper_bound: 65_536 },
    Bucket { name: "low_res", upper_bound: 480_000 },
    Bucket { name: "sd", upper_bound: 786_432 },
    Bucket { name: "hd", upper_bound: 2_000_000 },
    Bucket { name: "huge", upper_bound: u64::MAX },
];

/// Video length buckets, in whole seconds.
pub const LENGTH_BUCKETS: &[Bucket] = &[
    Bucket { name: "very_short", upper_bound: 15 },
    Bucket { name: "short", upper_bound: 60 },
    Bucket { name: "long", upper_bound: 600 },
    Bucket { name: "very_long", upper_bound: u64::MAX },
];

/// Tag applied when the loudness pass finds a non-silent audio track.
pub const HAS_AUDIO_TAG: &str = "has_audio";

/// Returns the name of the first bucket whose bound `value` does not
/// exceed. The catch-all bound of `u64::MAX` guarantees a match.
pub fn bucket_for(table: &[Bucket], value: u64) -> &'static str {
    table
        .iter()
        .find(|b| value <= b.upper_bound)
        .expect("classification tables end in a catch-all bucket")
        .name
}

pub fn size_bucket(byte_size: u64) -> &'static str {
    bucket_for(SIZE_BUCKETS, byte_size)
}

pub fn area_bucket(width: u32, height: u32) -> &'static str {
    bucket_for(AREA_BUCKETS, u64::from(width) * u64::from(height))
}

pub fn length_bucket(duration_secs: f64) -> &'static str {
    bucket_for(LENGTH_BUCKETS, duration_secs.max(0.0) as u64)
}

/// Derives the automated tag list for an extracted metadata record: a
/// size bucket, a dimension bucket, a length bucket for video, and the
/// audio tag when applicable.
pub fn derive_tags(meta: &MediaMeta) -> Vec<String> {
    let mut tags = vec![
        size_bucket(meta.byte_size.max(0) as u64).to_string(),
        area_bucket(meta.width, meta.height).to_string(),
    ];
    if meta.is_video {
        tags.push(length_bucket(meta.duration).to_string());
    }
    if meta.has_audio {
        tags.push(HAS_AUDIO_TAG.to_string());
    }
    tags
}
