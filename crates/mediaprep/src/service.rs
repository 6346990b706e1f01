//! Pipeline wiring: channels, broker thread, worker pool, shutdown.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use log::{error, info};

use crate::apply::{ResultApplier, SearchIndex};
use crate::broker::{Broker, WorkRequest};
use crate::config::Settings;
use crate::db::Database;
use crate::inspect::Inspector;
use crate::worker::WorkerPool;

/// A running pipeline: one broker thread and a pool of workers.
///
/// All cross-component state is explicit here — the stop flag and wake
/// channels belong to this instance and are passed into each loop, so
/// two pipelines in one process never interfere.
pub struct PipelineService {
    broker: Option<JoinHandle<()>>,
    pool: Option<WorkerPool>,
    request_tx: Option<Sender<WorkRequest>>,
    result_tx: Option<Sender<Vec<u8>>>,
}

impl PipelineService {
    /// Opens the channels and spawns the broker and worker threads.
    pub fn start(
        db: Database,
        inspector: Arc<dyn Inspector>,
        index: Arc<dyn SearchIndex>,
        settings: &Settings,
    ) -> Self {
        let worker_count = settings.effective_worker_count();

        let (request_tx, request_rx) = bounded::<WorkRequest>(worker_count * 2);
        let (result_tx, result_rx) = bounded::<Vec<u8>>(worker_count * 2);

        let applier = ResultApplier::new(db.clone(), index);
        let broker = Broker::new(db, applier, request_rx, result_rx);
        let broker_handle = std::thread::spawn(move || broker.run());

        let stop = Arc::new(AtomicBool::new(false));
        let pool = WorkerPool::spawn(
            worker_count,
            request_tx.clone(),
            result_tx.clone(),
            inspector,
            Duration::from_secs(settings.idle_wake_secs),
            stop,
        );

        info!("Pipeline started with {} workers", worker_count);

        Self {
            broker: Some(broker_handle),
            pool: Some(pool),
            request_tx: Some(request_tx),
            result_tx: Some(result_tx),
        }
    }

    /// Interrupts every idle worker's sleep so newly enqueued work is
    /// picked up immediately. The ops surface calls this after a bulk
    /// enqueue or requeue.
    pub fn wake_workers(&self) {
        if let Some(pool) = &self.pool {
            pool.wake_all();
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::worker_count)
    }

    /// Graceful shutdown: workers finish their in-flight jobs and exit,
    /// then the broker drains the remaining results and exits.
    pub fn stop(mut self) {
        info!("Stopping pipeline...");

        if let Some(pool) = self.pool.take() {
            pool.stop();
            pool.join();
        }

        // The workers' channel clones are gone once they exit; dropping
        // ours lets the broker's receivers disconnect so it drains and
        // stops.
        drop(self.request_tx.take());
        drop(self.result_tx.take());

        if let Some(broker) = self.broker.take() {
            if broker.join().is_err() {
                error!("Broker thread panicked");
            }
        }

        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::NoopSearchIndex;
    use crate::db::media_repo::{MediaDescriptor, MediaMeta};
    use crate::inspect::InspectionOutcome;

    struct StubInspector;

    impl Inspector for StubInspector {
        fn inspect(&self, _descriptor: &MediaDescriptor) -> InspectionOutcome {
            InspectionOutcome::success(
                MediaMeta {
                    width: 640,
                    height: 480,
                    is_video: false,
                    duration: 0.0,
                    has_audio: false,
                    byte_size: 1000,
                },
                vec!["tiny".to_string()],
            )
        }
    }

    #[test]
    fn test_start_and_stop() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings {
            worker_count: 2,
            idle_wake_secs: 300,
            ..Settings::default()
        };

        let service = PipelineService::start(
            db,
            Arc::new(StubInspector),
            Arc::new(NoopSearchIndex),
            &settings,
        );
        assert_eq!(service.worker_count(), 2);

        // Must return promptly even with all workers asleep.
        service.stop();
    }
}
