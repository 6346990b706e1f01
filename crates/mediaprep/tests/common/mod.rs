//! Shared harness for the pipeline integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mediaprep::db::media_repo::{self, MediaDescriptor, MediaMeta};
use mediaprep::db::{job_repo, Database};
use mediaprep::error::IndexError;
use mediaprep::{InspectionOutcome, Inspector, SearchIndex};

/// Inspector double: counts inspections per storage id and fails the
/// ones listed in `fail_with`.
pub struct CountingInspector {
    pub calls: Mutex<HashMap<String, usize>>,
    pub fail_with: HashMap<String, String>,
}

impl CountingInspector {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            fail_with: HashMap::new(),
        }
    }

    pub fn failing(storage_id: &str, message: &str) -> Self {
        let mut fail_with = HashMap::new();
        fail_with.insert(storage_id.to_string(), message.to_string());
        Self {
            calls: Mutex::new(HashMap::new()),
            fail_with,
        }
    }

    pub fn call_count(&self, storage_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(storage_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl Inspector for CountingInspector {
    fn inspect(&self, descriptor: &MediaDescriptor) -> InspectionOutcome {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(descriptor.storage_id.clone())
            .or_insert(0) += 1;

        if let Some(message) = self.fail_with.get(&descriptor.storage_id) {
            return InspectionOutcome::failure(message.clone());
        }

        InspectionOutcome::success(
            MediaMeta {
                width: 1920,
                height: 1080,
                is_video: true,
                duration: 3.0,
                has_audio: false,
                byte_size: 2_100_000,
            },
            vec![
                "small".to_string(),
                "huge".to_string(),
                "very_short".to_string(),
            ],
        )
    }
}

/// Search index double that records every merge call.
pub struct RecordingIndex {
    pub calls: Mutex<Vec<(i64, Vec<String>)>>,
}

impl RecordingIndex {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn merged_media_ids(&self) -> HashSet<i64> {
        self.calls.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }
}

impl SearchIndex for RecordingIndex {
    fn merge_tags(&self, media_id: i64, tags: &[String]) -> Result<(), IndexError> {
        self.calls.lock().unwrap().push((media_id, tags.to_vec()));
        Ok(())
    }
}

/// Inserts a media row with a synthetic descriptor and enqueues a job
/// for it. Returns (media_id, job_id).
pub fn seed_job(db: &Database, storage_id: &str) -> (i64, i64) {
    let media_id = media_repo::insert(
        db,
        &MediaDescriptor {
            storage_id: storage_id.to_string(),
            mime: "video/webm".to_string(),
            full_path: format!("/data/full/{storage_id}.webm"),
            thumb_path: format!("/data/thumbs/{storage_id}.jpg"),
        },
    )
    .unwrap();
    let job = job_repo::enqueue(db, media_id).unwrap();
    (media_id, job.id)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// True when no job is queued or in flight.
pub fn queue_drained(db: &Database) -> bool {
    let counts = job_repo::count_by_state(db).unwrap();
    counts.queued == 0 && counts.in_flight == 0
}
