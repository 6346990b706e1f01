//! The worker pool: N stateless threads pulling work from the broker.
//!
//! Workers share no in-memory state with each other — everything shared
//! lives in the job store on the broker's side of the channels. Each
//! worker owns a capacity-1 wake channel; sending on it interrupts the
//! idle sleep, and because the channel holds at most one token, wakes
//! never stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::broker::WorkRequest;
use crate::inspect::Inspector;
use crate::protocol::{self, ResultPayload, WorkReply};

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    wake_senders: Vec<Sender<()>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` worker threads running the pull → inspect →
    /// push loop.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn spawn(
        worker_count: usize,
        requests: Sender<WorkRequest>,
        results: Sender<Vec<u8>>,
        inspector: Arc<dyn Inspector>,
        idle_wake: Duration,
        stop: Arc<AtomicBool>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");

        let mut workers = Vec::with_capacity(worker_count);
        let mut wake_senders = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (wake_tx, wake_rx) = bounded::<()>(1);
            wake_senders.push(wake_tx);

            let request_tx = requests.clone();
            let result_tx = results.clone();
            let worker_inspector = Arc::clone(&inspector);
            let stop_flag = Arc::clone(&stop);

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    request_tx,
                    result_tx,
                    wake_rx,
                    worker_inspector,
                    idle_wake,
                    stop_flag,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            workers,
            wake_senders,
            stop,
        }
    }

    /// Interrupts every sleeping worker. A worker that is busy keeps at
    /// most one pending token, so repeated broadcasts do not pile up.
    pub fn wake_all(&self) {
        for wake in &self.wake_senders {
            let _ = wake.try_send(());
        }
    }

    /// Signals all workers to stop and interrupts their sleeps. A worker
    /// processing a job finishes its result submission first.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.wake_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker thread to exit.
    pub fn join(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if worker.join().is_err() {
                error!("Worker {} panicked", i);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    requests: Sender<WorkRequest>,
    results: Sender<Vec<u8>>,
    wake: Receiver<()>,
    inspector: Arc<dyn Inspector>,
    idle_wake: Duration,
    stop: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    let (reply_tx, reply_rx) = bounded::<Vec<u8>>(1);

    loop {
        if stop.load(Ordering::Relaxed) {
            debug!("Worker {} received stop signal", worker_id);
            break;
        }

        if requests
            .send(WorkRequest {
                reply: reply_tx.clone(),
            })
            .is_err()
        {
            debug!("Worker {} request channel closed", worker_id);
            break;
        }

        // The only blocking receive in the loop: wait for the broker's
        // reply to this request.
        let bytes = match reply_rx.recv() {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("Worker {} reply channel closed", worker_id);
                break;
            }
        };

        match protocol::decode::<WorkReply>(&bytes) {
            Err(e) => {
                warn!("Worker {} discarding malformed work reply: {}", worker_id, e);
            }
            Ok(WorkReply::NoWork) => {
                // Bounded sleep; a wake token or the timeout ends it.
                match wake.recv_timeout(idle_wake) {
                    Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("Worker {} wake channel closed", worker_id);
                        break;
                    }
                }
            }
            Ok(WorkReply::Fatal) => {
                error!(
                    "Worker {} received fatal reply from broker, stopping",
                    worker_id
                );
                break;
            }
            Ok(WorkReply::Job(assignment)) => {
                debug!(
                    "Worker {} processing job {} (media {})",
                    worker_id, assignment.job_id, assignment.media_id
                );

                let outcome = inspector.inspect(&assignment.descriptor);
                let payload = if let Some(meta) = outcome.meta {
                    ResultPayload::success(&assignment, meta, outcome.tags)
                } else {
                    ResultPayload::failure(&assignment, outcome.message)
                };

                match protocol::encode(&payload) {
                    Ok(bytes) => {
                        if results.send(bytes).is_err() {
                            error!("Worker {} result channel closed", worker_id);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Worker {} failed to encode result: {}", worker_id, e)
                    }
                }
                // No sleep after productive work — ask again right away.
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crossbeam_channel::unbounded;

    use crate::db::media_repo::{MediaDescriptor, MediaMeta};
    use crate::inspect::InspectionOutcome;

    struct StubInspector {
        calls: AtomicUsize,
    }

    impl Inspector for StubInspector {
        fn inspect(&self, _descriptor: &MediaDescriptor) -> InspectionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    fn sample_descriptor() -> MediaDescriptor {
        MediaDescriptor {
            storage_id: "pool01".to_string(),
            mime: "image/png".to_string(),
            full_path: "/data/full/pool01.png".to_string(),
            thumb_path: "/data/thumbs/pool01.jpg".to_string(),
        }
    }

    /// Plays broker for one worker: answer its first request with the
    /// given reply, then keep answering NoWork.
    fn answer_requests(requests: Receiver<WorkRequest>, mut replies: Vec<WorkReply>) {
        thread::spawn(move || {
            while let Ok(request) = requests.recv() {
                let reply = if replies.is_empty() {
                    WorkReply::NoWork
                } else {
                    replies.remove(0)
                };
                let _ = request.reply.send(protocol::encode(&reply).unwrap());
            }
        });
    }

    #[test]
    fn test_worker_processes_job_and_submits_result() {
        let (request_tx, request_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let inspector = Arc::new(StubInspector {
            calls: AtomicUsize::new(0),
        });
        let stop = Arc::new(AtomicBool::new(false));

        answer_requests(
            request_rx,
            vec![WorkReply::Job(crate::protocol::WorkAssignment {
                job_id: 1,
                media_id: 2,
                descriptor: sample_descriptor(),
            })],
        );

        let pool = WorkerPool::spawn(
            1,
            request_tx,
            result_tx,
            inspector.clone(),
            Duration::from_secs(60),
            stop,
        );

        let bytes = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let payload: ResultPayload = protocol::decode(&bytes).unwrap();
        assert_eq!(payload.job_id, 1);
        assert_eq!(payload.media_id, 2);
        assert!(payload.success);
        assert_eq!(payload.tags, vec!["tiny"]);
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 1);

        pool.stop();
        pool.join();
    }

    #[test]
    fn test_worker_stops_on_fatal() {
        let (request_tx, request_rx) = unbounded();
        let (result_tx, _result_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        answer_requests(request_rx, vec![WorkReply::Fatal]);

        let pool = WorkerPool::spawn(
            1,
            request_tx,
            result_tx,
            Arc::new(StubInspector {
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(60),
            stop,
        );

        // The worker exits on its own without a stop signal.
        pool.join();
    }

    #[test]
    fn test_wake_interrupts_idle_sleep() {
        let (request_tx, request_rx) = unbounded::<WorkRequest>();
        let (result_tx, _result_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let request_count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&request_count);
        thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = request
                    .reply
                    .send(protocol::encode(&WorkReply::NoWork).unwrap());
            }
        });

        // A sleep long enough that only a wake can explain a second
        // request arriving quickly.
        let pool = WorkerPool::spawn(
            1,
            request_tx,
            result_tx,
            Arc::new(StubInspector {
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(300),
            stop,
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while request_count.load(Ordering::SeqCst) < 1 {
            assert!(std::time::Instant::now() < deadline, "no first request");
            thread::sleep(Duration::from_millis(10));
        }

        pool.wake_all();

        while request_count.load(Ordering::SeqCst) < 2 {
            assert!(
                std::time::Instant::now() < deadline,
                "wake did not interrupt the sleep"
            );
            thread::sleep(Duration::from_millis(10));
        }

        pool.stop();
        pool.join();
    }

    #[test]
    fn test_stop_interrupts_sleeping_workers() {
        let (request_tx, request_rx) = unbounded();
        let (result_tx, _result_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        answer_requests(request_rx, vec![]);

        let pool = WorkerPool::spawn(
            2,
            request_tx,
            result_tx,
            Arc::new(StubInspector {
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(300),
            stop,
        );
        assert_eq!(pool.worker_count(), 2);
        assert!(!pool.is_stopped());

        // Give both workers time to reach their idle sleep, then stop;
        // join would hang for minutes if the sleep were not interrupted.
        thread::sleep(Duration::from_millis(100));
        pool.stop();
        pool.join();
    }

    #[test]
    fn test_worker_discards_malformed_reply_and_continues() {
        let (request_tx, request_rx) = unbounded::<WorkRequest>();
        let (result_tx, result_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let inspector = Arc::new(StubInspector {
            calls: AtomicUsize::new(0),
        });

        // First reply is garbage, second is a real job.
        let assignment = crate::protocol::WorkAssignment {
            job_id: 9,
            media_id: 9,
            descriptor: sample_descriptor(),
        };
        thread::spawn(move || {
            let mut first = true;
            while let Ok(request) = request_rx.recv() {
                let bytes = if first {
                    first = false;
                    vec![0xde, 0xad]
                } else {
                    protocol::encode(&WorkReply::Job(assignment.clone())).unwrap()
                };
                let _ = request.reply.send(bytes);
            }
        });

        let pool = WorkerPool::spawn(
            1,
            request_tx,
            result_tx,
            inspector,
            Duration::from_secs(60),
            stop,
        );

        // The malformed reply is skipped and the next request still
        // produces a result.
        let bytes = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let payload: ResultPayload = protocol::decode(&bytes).unwrap();
        assert_eq!(payload.job_id, 9);

        pool.stop();
        pool.join();
    }
}
